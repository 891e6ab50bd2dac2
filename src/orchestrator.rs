use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, warn};

use crate::comments::{CommentId, CommentTree, ThreadKey, MAX_LEVEL};
use crate::config::Config;
use crate::data::{CommentDto, CommentPage, NewComment, Services, UserId, VideoDetail, Viewer};
use crate::error::{EngagementError, Result};
use crate::reaction::{PendingReaction, ReactionAction, ReactionState};
use crate::watch::{PlaybackEvent, WatchEffect, WatchSession};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Toast-style message for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub page_size: u32,
    pub reply_page_size: u32,
    pub history_floor_secs: u64,
    pub tick_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self {
            page_size: cfg.comments.page_size,
            reply_page_size: cfg.comments.reply_page_size,
            history_floor_secs: cfg.watch.history_floor_secs,
            tick_interval: cfg.watch.tick_interval,
        }
    }
}

/// Engagement state for the one video currently open.
#[derive(Debug, Clone)]
pub struct VideoSession {
    id: SessionId,
    video_id: String,
    tree: CommentTree,
    reaction: ReactionState,
    watch: WatchSession,
}

impl VideoSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn comments(&self) -> &CommentTree {
        &self.tree
    }

    pub fn reaction(&self) -> &ReactionState {
        &self.reaction
    }

    pub fn watch(&self) -> &WatchSession {
        &self.watch
    }
}

enum Completion {
    Page {
        session: SessionId,
        thread: ThreadKey,
        result: anyhow::Result<CommentPage>,
    },
    Created {
        session: SessionId,
        thread: ThreadKey,
        result: anyhow::Result<CommentDto>,
    },
    Deleted {
        session: SessionId,
        id: CommentId,
        parent_id: Option<CommentId>,
        level: u8,
        result: anyhow::Result<()>,
    },
    Reaction {
        session: SessionId,
        pending: PendingReaction,
        result: anyhow::Result<()>,
    },
    Watch {
        session: SessionId,
        effect: WatchEffect,
        result: anyhow::Result<()>,
    },
}

impl Completion {
    fn session(&self) -> SessionId {
        match self {
            Completion::Page { session, .. }
            | Completion::Created { session, .. }
            | Completion::Deleted { session, .. }
            | Completion::Reaction { session, .. }
            | Completion::Watch { session, .. } => *session,
        }
    }
}

/// Binds UI intents to the comment tree, reaction state and watch session of
/// the open video, and to the remote collaborators behind them.
///
/// All state is mutated on the thread that owns the orchestrator. Remote
/// calls run on worker threads and come back through [`Orchestrator::poll`].
pub struct Orchestrator {
    services: Services,
    settings: Settings,
    viewer: Option<Viewer>,
    active: Option<VideoSession>,
    next_session: SessionId,
    pending_pages: HashSet<ThreadKey>,
    in_flight: usize,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    notices: VecDeque<Notice>,
}

impl Orchestrator {
    pub fn new(services: Services, settings: Settings) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            services,
            settings,
            viewer: None,
            active: None,
            next_session: 0,
            pending_pages: HashSet::new(),
            in_flight: 0,
            completion_tx,
            completion_rx,
            notices: VecDeque::new(),
        }
    }

    pub fn set_viewer(&mut self, viewer: Option<Viewer>) {
        self.viewer = viewer;
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    fn viewer_id(&self) -> Option<UserId> {
        self.viewer.as_ref().map(|viewer| viewer.id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replaces whatever was open with a fresh session for `detail`.
    pub fn open_video(&mut self, detail: &VideoDetail) -> SessionId {
        self.next_session += 1;
        let id = self.next_session;
        self.pending_pages.clear();
        self.active = Some(VideoSession {
            id,
            video_id: detail.code.clone(),
            tree: CommentTree::new(
                self.settings.page_size,
                self.settings.reply_page_size,
                detail.comment_count,
            ),
            reaction: ReactionState::new(
                detail.viewer_reaction(),
                detail.like_count,
                detail.dislike_count,
            ),
            watch: WatchSession::new(self.settings.history_floor_secs),
        });
        debug!("opened video {} as session {}", detail.code, id);
        id
    }

    pub fn close_video(&mut self) {
        if let Some(session) = self.active.take() {
            debug!("closed session {} ({})", session.id, session.video_id);
        }
        self.pending_pages.clear();
    }

    pub fn active(&self) -> Option<&VideoSession> {
        self.active.as_ref()
    }

    /// Number of remote calls whose outcome has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_loading(&self, thread: ThreadKey) -> bool {
        self.pending_pages.contains(&thread)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Requests the next page of root comments. `Ok(false)` means a load for
    /// the same list is still pending and nothing was sent.
    pub fn load_root_comments(&mut self) -> Result<bool> {
        self.load_thread(ThreadKey::Root)
    }

    pub fn load_replies(&mut self, parent_id: CommentId, parent_level: u8) -> Result<bool> {
        self.load_thread(ThreadKey::Replies {
            parent_id,
            parent_level,
        })
    }

    fn load_thread(&mut self, thread: ThreadKey) -> Result<bool> {
        let active = self.active.as_ref().ok_or(EngagementError::NoActiveVideo)?;
        if self.pending_pages.contains(&thread) {
            return Ok(false);
        }
        let request = match active.tree.next_page_request(thread) {
            Ok(request) => request,
            Err(err) => return self.reject(err),
        };
        let (session, video_id) = (active.id, active.video_id.clone());
        self.pending_pages.insert(thread);
        let service = Arc::clone(&self.services.comments);
        debug!(
            "loading page {} of {:?} for {}",
            request.page, thread, video_id
        );
        self.spawn(move || Completion::Page {
            session,
            thread,
            result: service.list_comments(
                &video_id,
                request.parent_id(),
                request.page,
                request.size,
            ),
        });
        Ok(true)
    }

    /// Posts a comment, or a reply when `reply_to` names the parent's id and
    /// level. The node is inserted once the server has assigned its id.
    pub fn post_comment(&mut self, content: &str, reply_to: Option<(CommentId, u8)>) -> Result<()> {
        if self.viewer.is_none() {
            return self.reject(EngagementError::NotSignedIn);
        }
        let content = content.trim();
        if content.is_empty() {
            return self.reject(EngagementError::EmptyContent);
        }
        let active = self.active.as_ref().ok_or(EngagementError::NoActiveVideo)?;
        let (thread, level) = match reply_to {
            None => (ThreadKey::Root, 1),
            Some((parent_id, parent_level)) => {
                if parent_level == 0 || parent_level >= MAX_LEVEL {
                    return self.reject(EngagementError::invariant(format!(
                        "cannot reply to a level {parent_level} comment"
                    )));
                }
                if active.tree.find_node(parent_id, parent_level).is_none() {
                    return self.reject(EngagementError::StaleTree { id: parent_id });
                }
                let thread = ThreadKey::Replies {
                    parent_id,
                    parent_level,
                };
                (thread, parent_level + 1)
            }
        };
        let comment = NewComment {
            video_id: active.video_id.clone(),
            content: content.to_string(),
            parent_id: reply_to.map(|(parent_id, _)| parent_id),
            level,
        };
        let session = active.id;
        let service = Arc::clone(&self.services.comments);
        self.spawn(move || Completion::Created {
            session,
            thread,
            result: service.create_comment(&comment),
        });
        Ok(())
    }

    /// Deletes a comment after `confirm` agrees. Returns whether a request was sent.
    pub fn delete_comment<F>(
        &mut self,
        id: CommentId,
        parent_id: Option<CommentId>,
        level: u8,
        confirm: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> bool,
    {
        let active = self.active.as_ref().ok_or(EngagementError::NoActiveVideo)?;
        if active.tree.find_node(id, level).is_none() {
            return self.reject(EngagementError::StaleTree { id });
        }
        let session = active.id;
        if !confirm() {
            return Ok(false);
        }
        let service = Arc::clone(&self.services.comments);
        self.spawn(move || Completion::Deleted {
            session,
            id,
            parent_id,
            level,
            result: service.delete_comment(id),
        });
        Ok(true)
    }

    pub fn toggle_like(&mut self) -> Result<ReactionAction> {
        self.toggle_reaction(ReactionState::toggle_like)
    }

    pub fn toggle_dislike(&mut self) -> Result<ReactionAction> {
        self.toggle_reaction(ReactionState::toggle_dislike)
    }

    fn toggle_reaction(
        &mut self,
        toggle: fn(&mut ReactionState) -> PendingReaction,
    ) -> Result<ReactionAction> {
        let active = self.active.as_mut().ok_or(EngagementError::NoActiveVideo)?;
        let pending = toggle(&mut active.reaction);
        let (session, video_id) = (active.id, active.video_id.clone());
        let service = Arc::clone(&self.services.reactions);
        self.spawn(move || Completion::Reaction {
            session,
            pending,
            result: service.set_video_reaction(&video_id, pending.action),
        });
        Ok(pending.action)
    }

    pub fn handle_playback(&mut self, event: PlaybackEvent) -> Result<()> {
        let active = self.active.as_mut().ok_or(EngagementError::NoActiveVideo)?;
        let effects = active.watch.handle(event);
        let (session, video_id) = (active.id, active.video_id.clone());
        self.dispatch_watch(session, &video_id, effects);
        Ok(())
    }

    /// One tick of the watch clock; see [`Orchestrator::ticker`].
    pub fn tick(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let effects = active.watch.tick();
        let (session, video_id) = (active.id, active.video_id.clone());
        self.dispatch_watch(session, &video_id, effects);
    }

    /// A channel that fires once per configured tick interval. Callers
    /// select on it next to their UI events and call [`Orchestrator::tick`].
    pub fn ticker(&self) -> Receiver<Instant> {
        crossbeam_channel::tick(self.settings.tick_interval)
    }

    /// Applies every completion that has already arrived.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) => {
                    self.apply(completion);
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Blocks until nothing is in flight or `timeout` passes.
    pub fn settle(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.apply(completion);
                    applied += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        applied
    }

    fn spawn<F>(&mut self, job: F)
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.completion_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(job());
        });
    }

    fn dispatch_watch(&mut self, session: SessionId, video_id: &str, effects: Vec<WatchEffect>) {
        for effect in effects {
            let service = Arc::clone(&self.services.watch);
            let video_id = video_id.to_string();
            debug!("watch effect {:?} for {}", effect, video_id);
            self.spawn(move || {
                let result = match effect {
                    WatchEffect::LogPosition { position }
                    | WatchEffect::AddToHistory { position } => {
                        service.log_watch_history(&video_id, position)
                    }
                    WatchEffect::IncrementView => service.increment_view(&video_id),
                };
                Completion::Watch {
                    session,
                    effect,
                    result,
                }
            });
        }
    }

    /// Surfaces a rejected intent. Wiring bugs are logged, not shown.
    fn reject<T>(&mut self, err: EngagementError) -> Result<T> {
        match &err {
            EngagementError::InvariantViolation(message) => error!("{}", message),
            EngagementError::StaleTree { .. } => {
                self.notices
                    .push_back(Notice::error("Could not find that comment anymore, please retry."));
            }
            other => self.notices.push_back(Notice::error(other.to_string())),
        }
        Err(err)
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let current = self.active.as_ref().map(|session| session.id);
        if current != Some(completion.session()) {
            debug!(
                "discarding completion for stale session {}",
                completion.session()
            );
            return;
        }
        match completion {
            Completion::Page { thread, result, .. } => self.apply_page(thread, result),
            Completion::Created { thread, result, .. } => self.apply_created(thread, result),
            Completion::Deleted {
                id,
                parent_id,
                level,
                result,
                ..
            } => self.apply_deleted(id, parent_id, level, result),
            Completion::Reaction {
                pending, result, ..
            } => self.apply_reaction(pending, result),
            Completion::Watch { effect, result, .. } => {
                if let Err(err) = result {
                    warn!("best-effort {:?} failed: {:#}", effect, err);
                }
            }
        }
    }

    fn apply_page(&mut self, thread: ThreadKey, result: anyhow::Result<CommentPage>) {
        self.pending_pages.remove(&thread);
        let viewer = self.viewer_id();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match result {
            Ok(page) => match active.tree.apply_page(thread, page, viewer) {
                Ok(true) => {}
                Ok(false) => debug!("page for {:?} already applied", thread),
                Err(err) => debug!("dropping page for {:?}: {}", thread, err),
            },
            Err(err) => {
                let err = EngagementError::remote("Loading comments", &err);
                self.notices.push_back(Notice::error(err.to_string()));
            }
        }
    }

    fn apply_created(&mut self, thread: ThreadKey, result: anyhow::Result<CommentDto>) {
        let mut dto = match result {
            Ok(dto) => dto,
            Err(err) => {
                let err = EngagementError::remote("Posting comment", &err);
                self.notices.push_back(Notice::error(err.to_string()));
                return;
            }
        };
        if let Some(viewer) = &self.viewer {
            if dto.name.is_empty() {
                dto.name = viewer.display_name.clone();
            }
            if dto.username.is_empty() {
                dto.username = viewer.username.clone();
            }
            if dto.avatar.is_none() {
                dto.avatar = viewer.avatar.clone();
            }
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let outcome = match thread {
            ThreadKey::Root => {
                dto.parent_id = None;
                dto.level = 1;
                let mut node = active.tree.node_from_dto(dto, None);
                node.owned_by_viewer = true;
                active.tree.insert_root(node)
            }
            ThreadKey::Replies {
                parent_id,
                parent_level,
            } => {
                dto.parent_id = Some(parent_id);
                dto.level = parent_level + 1;
                let mut node = active.tree.node_from_dto(dto, None);
                node.owned_by_viewer = true;
                active.tree.insert_reply(parent_id, parent_level, node)
            }
        };
        let notice = match outcome {
            Ok(()) => Notice::success("Comment posted!"),
            Err(EngagementError::StaleTree { .. }) => {
                Notice::error("Could not post reply, please retry.")
            }
            Err(err) => {
                error!("posted comment could not be placed: {}", err);
                Notice::error("Could not post reply, please retry.")
            }
        };
        self.notices.push_back(notice);
    }

    fn apply_deleted(
        &mut self,
        id: CommentId,
        parent_id: Option<CommentId>,
        level: u8,
        result: anyhow::Result<()>,
    ) {
        if let Err(err) = result {
            let err = EngagementError::remote("Deleting comment", &err);
            self.notices.push_back(Notice::error(err.to_string()));
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Err(err) = active.tree.remove_node(id, parent_id, level) {
            debug!("deleted comment {} was not in the tree: {}", id, err);
        }
        self.notices.push_back(Notice::success("Comment deleted!"));
    }

    fn apply_reaction(&mut self, pending: PendingReaction, result: anyhow::Result<()>) {
        let Err(err) = result else {
            debug!("{} video", pending.action.describe());
            return;
        };
        if let Some(active) = self.active.as_mut() {
            if !active.reaction.rollback(&pending) {
                debug!("reaction moved on since {:?}; keeping it", pending.action);
            }
        }
        let err = EngagementError::remote("Updating reaction", &err);
        self.notices.push_back(Notice::error(err.to_string()));
    }
}
