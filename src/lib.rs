#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod backend;
pub mod comments;
pub mod config;
pub mod cursor;
pub mod data;
pub mod error;
pub mod orchestrator;
pub mod reaction;
pub mod watch;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{list_comments, replay};
pub use comments::{CommentId, CommentNode, CommentTree, ThreadKey};
pub use error::{EngagementError, Result};
pub use orchestrator::{Notice, NoticeKind, Orchestrator, Settings};
pub use reaction::{Reaction, ReactionAction, ReactionState};
pub use watch::{PlaybackEvent, WatchEffect, WatchSession};
