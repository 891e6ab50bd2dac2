use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend;
use crate::comments::CommentId;
use crate::reaction::{Reaction, ReactionAction};

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: CommentId,
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub level: u8,
    pub content: String,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub dislike_count: u32,
    #[serde(default)]
    pub child_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentPage {
    pub items: Vec<CommentDto>,
    pub total: usize,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub video_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub level: u8,
}

/// The signed-in user acting on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

/// The parts of a video's detail payload the engagement engine is seeded from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    pub code: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub dislike_count: u64,
    /// `1` liked, `2` disliked, absent for no reaction.
    #[serde(default)]
    pub reaction: Option<u8>,
    #[serde(default)]
    pub comment_count: u64,
}

impl VideoDetail {
    pub fn viewer_reaction(&self) -> Reaction {
        match self.reaction {
            Some(1) => Reaction::Liked,
            Some(2) => Reaction::Disliked,
            _ => Reaction::None,
        }
    }
}

pub trait CommentService: Send + Sync {
    fn list_comments(
        &self,
        video_id: &str,
        parent_id: Option<CommentId>,
        page: u32,
        size: u32,
    ) -> Result<CommentPage>;
    fn create_comment(&self, comment: &NewComment) -> Result<CommentDto>;
    fn delete_comment(&self, id: CommentId) -> Result<()>;
}

pub trait ReactionService: Send + Sync {
    fn set_video_reaction(&self, video_id: &str, action: ReactionAction) -> Result<()>;
}

pub trait WatchService: Send + Sync {
    fn increment_view(&self, video_id: &str) -> Result<()>;
    fn log_watch_history(&self, video_id: &str, position: u64) -> Result<()>;
}

/// The collaborators an orchestrator talks to.
#[derive(Clone)]
pub struct Services {
    pub comments: Arc<dyn CommentService>,
    pub reactions: Arc<dyn ReactionService>,
    pub watch: Arc<dyn WatchService>,
}

impl Services {
    pub fn rest(client: Arc<backend::Client>) -> Self {
        Self {
            comments: Arc::new(RestCommentService::new(client.clone())),
            reactions: Arc::new(RestReactionService::new(client.clone())),
            watch: Arc::new(RestWatchService::new(client)),
        }
    }

    pub fn mock(backend: Arc<MockBackend>) -> Self {
        Self {
            comments: backend.clone(),
            reactions: backend.clone(),
            watch: backend,
        }
    }
}

pub struct RestCommentService {
    client: Arc<backend::Client>,
}

impl RestCommentService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RestCommentService {
    fn list_comments(
        &self,
        video_id: &str,
        parent_id: Option<CommentId>,
        page: u32,
        size: u32,
    ) -> Result<CommentPage> {
        self.client
            .comments(video_id, parent_id, page, size)
            .context("fetch comments")
    }

    fn create_comment(&self, comment: &NewComment) -> Result<CommentDto> {
        self.client
            .create_comment(comment)
            .context("create comment")
    }

    fn delete_comment(&self, id: CommentId) -> Result<()> {
        self.client.delete_comment(id).context("delete comment")
    }
}

pub struct RestReactionService {
    client: Arc<backend::Client>,
}

impl RestReactionService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl ReactionService for RestReactionService {
    fn set_video_reaction(&self, video_id: &str, action: ReactionAction) -> Result<()> {
        self.client
            .update_video(video_id, action.update_type())
            .context("update reaction")
    }
}

pub struct RestWatchService {
    client: Arc<backend::Client>,
}

impl RestWatchService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl WatchService for RestWatchService {
    fn increment_view(&self, video_id: &str) -> Result<()> {
        self.client
            .update_video(video_id, backend::INCREASE_VIEW)
            .context("increase view")
    }

    fn log_watch_history(&self, video_id: &str, position: u64) -> Result<()> {
        self.client
            .log_watch_history(video_id, position)
            .context("log watch history")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    ListComments,
    CreateComment,
    DeleteComment,
    SetReaction,
    IncrementView,
    LogWatchHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    ListComments {
        video_id: String,
        parent_id: Option<CommentId>,
        page: u32,
        size: u32,
    },
    CreateComment(NewComment),
    DeleteComment(CommentId),
    SetReaction {
        video_id: String,
        action: ReactionAction,
    },
    IncrementView {
        video_id: String,
    },
    LogWatchHistory {
        video_id: String,
        position: u64,
    },
}

impl RecordedCall {
    pub fn kind(&self) -> MockCall {
        match self {
            RecordedCall::ListComments { .. } => MockCall::ListComments,
            RecordedCall::CreateComment(_) => MockCall::CreateComment,
            RecordedCall::DeleteComment(_) => MockCall::DeleteComment,
            RecordedCall::SetReaction { .. } => MockCall::SetReaction,
            RecordedCall::IncrementView { .. } => MockCall::IncrementView,
            RecordedCall::LogWatchHistory { .. } => MockCall::LogWatchHistory,
        }
    }
}

/// In-memory backend for offline runs and tests. Keeps comments server-side
/// newest-first, records every call, and can be told to fail or stall.
pub struct MockBackend {
    state: Mutex<MockState>,
}

struct MockState {
    comments: Vec<(String, CommentDto)>,
    next_id: CommentId,
    author: UserId,
    calls: Vec<RecordedCall>,
    failing: HashSet<MockCall>,
    delay: Option<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                comments: Vec::new(),
                next_id: 1_000,
                author: 1,
                calls: Vec::new(),
                failing: HashSet::new(),
                delay: None,
            }),
        }
    }

    /// User id stamped on comments created through this backend.
    pub fn with_author(self, author: UserId) -> Self {
        self.state.lock().author = author;
        self
    }

    /// Appends an existing comment to the server-side ordering.
    pub fn seed_comment(&self, video_id: &str, comment: CommentDto) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(comment.id + 1);
        state.comments.push((video_id.to_string(), comment));
    }

    pub fn fail(&self, call: MockCall) {
        self.state.lock().failing.insert(call);
    }

    pub fn recover(&self, call: MockCall) {
        self.state.lock().failing.remove(&call);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: MockCall) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|recorded| recorded.kind() == call)
            .count()
    }

    fn record(&self, call: RecordedCall) -> Result<()> {
        let kind = call.kind();
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(call);
            if state.failing.contains(&kind) {
                bail!("mock: {:?} unavailable", kind);
            }
            state.delay
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        Ok(())
    }
}

impl CommentService for MockBackend {
    fn list_comments(
        &self,
        video_id: &str,
        parent_id: Option<CommentId>,
        page: u32,
        size: u32,
    ) -> Result<CommentPage> {
        self.record(RecordedCall::ListComments {
            video_id: video_id.to_string(),
            parent_id,
            page,
            size,
        })?;
        if page == 0 || size == 0 {
            bail!("mock: page and size start at 1");
        }
        let state = self.state.lock();
        let thread: Vec<&CommentDto> = state
            .comments
            .iter()
            .filter(|(video, comment)| video == video_id && comment.parent_id == parent_id)
            .map(|(_, comment)| comment)
            .collect();
        let offset = (page as usize - 1) * size as usize;
        let items = thread
            .iter()
            .skip(offset)
            .take(size as usize)
            .map(|comment| {
                let mut comment = (*comment).clone();
                comment.child_count = state
                    .comments
                    .iter()
                    .filter(|(video, child)| video == video_id && child.parent_id == Some(comment.id))
                    .count();
                comment
            })
            .collect();
        Ok(CommentPage {
            items,
            total: thread.len(),
            page,
        })
    }

    fn create_comment(&self, comment: &NewComment) -> Result<CommentDto> {
        self.record(RecordedCall::CreateComment(comment.clone()))?;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let now = Utc::now();
        let created = CommentDto {
            id,
            user_id: state.author,
            username: format!("user{}", state.author),
            name: String::new(),
            avatar: None,
            parent_id: comment.parent_id,
            level: comment.level,
            content: comment.content.clone(),
            like_count: 0,
            dislike_count: 0,
            child_count: 0,
            created_at: now,
            modified_at: Some(now),
        };
        state
            .comments
            .insert(0, (comment.video_id.clone(), created.clone()));
        Ok(created)
    }

    fn delete_comment(&self, id: CommentId) -> Result<()> {
        self.record(RecordedCall::DeleteComment(id))?;
        let mut state = self.state.lock();
        let before = state.comments.len();
        state.comments.retain(|(_, comment)| comment.id != id);
        if state.comments.len() == before {
            bail!("mock: comment {} not found", id);
        }
        Ok(())
    }
}

impl ReactionService for MockBackend {
    fn set_video_reaction(&self, video_id: &str, action: ReactionAction) -> Result<()> {
        self.record(RecordedCall::SetReaction {
            video_id: video_id.to_string(),
            action,
        })
    }
}

impl WatchService for MockBackend {
    fn increment_view(&self, video_id: &str) -> Result<()> {
        self.record(RecordedCall::IncrementView {
            video_id: video_id.to_string(),
        })
    }

    fn log_watch_history(&self, video_id: &str, position: u64) -> Result<()> {
        self.record(RecordedCall::LogWatchHistory {
            video_id: video_id.to_string(),
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(id: CommentId) -> CommentDto {
        CommentDto {
            id,
            user_id: 7,
            username: "ann".into(),
            name: "Ann".into(),
            avatar: None,
            parent_id: None,
            level: 1,
            content: format!("root {id}"),
            like_count: 0,
            dislike_count: 0,
            child_count: 0,
            created_at: Utc::now(),
            modified_at: None,
        }
    }

    #[test]
    fn mock_pages_and_counts_children() {
        let backend = MockBackend::new();
        backend.seed_comment("v", root(1));
        backend.seed_comment("v", root(2));
        backend.seed_comment("other", root(3));
        let mut reply = root(4);
        reply.parent_id = Some(1);
        reply.level = 2;
        backend.seed_comment("v", reply);

        let first = backend.list_comments("v", None, 1, 1).unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.items[0].id, 1);
        assert_eq!(first.items[0].child_count, 1);
        let second = backend.list_comments("v", None, 2, 1).unwrap();
        assert_eq!(second.items[0].id, 2);
        assert!(backend.list_comments("v", None, 3, 1).unwrap().items.is_empty());
        assert_eq!(backend.count(MockCall::ListComments), 3);
    }

    #[test]
    fn mock_creates_newest_first() {
        let backend = MockBackend::new().with_author(9);
        backend.seed_comment("v", root(1));
        let created = backend
            .create_comment(&NewComment {
                video_id: "v".into(),
                content: "fresh".into(),
                parent_id: None,
                level: 1,
            })
            .unwrap();
        assert_eq!(created.id, 1_000);
        assert_eq!(created.user_id, 9);
        let page = backend.list_comments("v", None, 1, 10).unwrap();
        assert_eq!(page.items[0].id, created.id);
    }

    #[test]
    fn mock_failures_are_recorded() {
        let backend = MockBackend::new();
        backend.fail(MockCall::IncrementView);
        assert!(backend.increment_view("v").is_err());
        backend.recover(MockCall::IncrementView);
        assert!(backend.increment_view("v").is_ok());
        assert_eq!(backend.count(MockCall::IncrementView), 2);
        assert!(backend.delete_comment(5).is_err());
    }

    #[test]
    fn video_detail_reaction_codes() {
        let detail: VideoDetail =
            serde_json::from_str(r#"{"code":"abc","likeCount":3,"reaction":2}"#).unwrap();
        assert_eq!(detail.viewer_reaction(), Reaction::Disliked);
        assert_eq!(detail.comment_count, 0);
        let detail = VideoDetail {
            reaction: Some(1),
            ..VideoDetail::default()
        };
        assert_eq!(detail.viewer_reaction(), Reaction::Liked);
        assert_eq!(VideoDetail::default().viewer_reaction(), Reaction::None);
    }

    #[test]
    fn new_comment_serializes_camel_case() {
        let body = serde_json::to_value(NewComment {
            video_id: "abc".into(),
            content: "hi".into(),
            parent_id: None,
            level: 1,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"videoId": "abc", "content": "hi", "level": 1})
        );
    }
}
