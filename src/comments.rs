use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::cursor::{Keyed, PageCursor};
use crate::data::{CommentDto, CommentPage, CommentService, UserId};
use crate::error::{EngagementError, Result};

pub type CommentId = i64;

/// Replies are only rendered and accepted down to this depth.
pub const MAX_LEVEL: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    /// Root comments are level 1.
    pub level: u8,
    pub content: String,
    pub author_id: UserId,
    pub author_username: String,
    pub author_display: String,
    pub author_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub dislike_count: u32,
    pub owned_by_viewer: bool,
    /// Server-reported number of direct replies; may exceed what is loaded.
    pub child_count: usize,
    pub replies: PageCursor<CommentNode>,
}

impl CommentNode {
    pub fn from_dto(dto: CommentDto, viewer: Option<UserId>, reply_page_size: u32) -> Self {
        let owned_by_viewer = viewer.is_some_and(|id| id > 0 && id == dto.user_id);
        Self {
            id: dto.id,
            parent_id: dto.parent_id,
            level: dto.level,
            content: dto.content,
            author_id: dto.user_id,
            author_username: dto.username,
            author_display: dto.name,
            author_avatar: dto.avatar,
            created_at: dto.created_at,
            like_count: dto.like_count,
            dislike_count: dto.dislike_count,
            owned_by_viewer,
            child_count: dto.child_count,
            replies: PageCursor::with_total(reply_page_size, dto.child_count),
        }
    }

    pub fn can_reply(&self) -> bool {
        self.level < MAX_LEVEL
    }

    /// Whether a "load more replies" control makes sense for this node.
    pub fn has_more_replies(&self) -> bool {
        self.can_reply() && self.replies.has_more()
    }
}

impl Keyed for CommentNode {
    type Key = CommentId;

    fn key(&self) -> CommentId {
        self.id
    }
}

/// Identifies which cursor a page belongs to: the root list or one comment's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKey {
    Root,
    Replies { parent_id: CommentId, parent_level: u8 },
}

/// The next page a cursor wants, computed before the fetch is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub thread: ThreadKey,
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn parent_id(&self) -> Option<CommentId> {
        match self.thread {
            ThreadKey::Root => None,
            ThreadKey::Replies { parent_id, .. } => Some(parent_id),
        }
    }
}

/// The comment forest of one video plus the video-level comment count.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentTree {
    roots: PageCursor<CommentNode>,
    reply_page_size: u32,
    comment_count: u64,
}

impl CommentTree {
    pub fn new(page_size: u32, reply_page_size: u32, comment_count: u64) -> Self {
        Self {
            roots: PageCursor::new(page_size),
            reply_page_size: reply_page_size.max(1),
            comment_count,
        }
    }

    pub fn roots(&self) -> &PageCursor<CommentNode> {
        &self.roots
    }

    /// Aggregate comment count shown for the whole video, replies included.
    pub fn comment_count(&self) -> u64 {
        self.comment_count
    }

    pub fn reply_page_size(&self) -> u32 {
        self.reply_page_size
    }

    pub fn node_from_dto(&self, dto: CommentDto, viewer: Option<UserId>) -> CommentNode {
        CommentNode::from_dto(dto, viewer, self.reply_page_size)
    }

    /// Finds the comment `id` that lives at depth `level`.
    pub fn find_node(&self, id: CommentId, level: u8) -> Option<&CommentNode> {
        find_in(self.roots.items(), id, level)
    }

    pub fn find_node_mut(&mut self, id: CommentId, level: u8) -> Option<&mut CommentNode> {
        find_in_mut(self.roots.items_mut(), id, level)
    }

    pub fn insert_root(&mut self, node: CommentNode) -> Result<()> {
        if node.level != 1 || node.parent_id.is_some() {
            return Err(EngagementError::invariant(format!(
                "comment {} at level {} is not a root comment",
                node.id, node.level
            )));
        }
        self.roots.prepend(node);
        self.comment_count += 1;
        Ok(())
    }

    pub fn insert_reply(
        &mut self,
        parent_id: CommentId,
        parent_level: u8,
        node: CommentNode,
    ) -> Result<()> {
        if parent_level == 0 || parent_level >= MAX_LEVEL {
            return Err(EngagementError::invariant(format!(
                "cannot reply to a level {parent_level} comment"
            )));
        }
        if node.level != parent_level + 1 || node.parent_id != Some(parent_id) {
            return Err(EngagementError::invariant(format!(
                "reply {} (level {}, parent {:?}) does not belong under comment {} at level {}",
                node.id, node.level, node.parent_id, parent_id, parent_level
            )));
        }
        let parent = self
            .find_node_mut(parent_id, parent_level)
            .ok_or(EngagementError::StaleTree { id: parent_id })?;
        parent.replies.prepend(node);
        parent.child_count += 1;
        self.comment_count += 1;
        Ok(())
    }

    /// Detaches a comment from its parent. Loaded sub-replies go with it.
    pub fn remove_node(
        &mut self,
        id: CommentId,
        parent_id: Option<CommentId>,
        level: u8,
    ) -> Result<CommentNode> {
        let removed = match parent_id {
            None => self
                .roots
                .remove(id)
                .ok_or(EngagementError::StaleTree { id })?,
            Some(parent_id) => {
                if level < 2 {
                    return Err(EngagementError::invariant(format!(
                        "comment {id} has parent {parent_id} but claims level {level}"
                    )));
                }
                let parent = self
                    .find_node_mut(parent_id, level - 1)
                    .ok_or(EngagementError::StaleTree { id: parent_id })?;
                let removed = parent
                    .replies
                    .remove(id)
                    .ok_or(EngagementError::StaleTree { id })?;
                parent.child_count = parent.child_count.saturating_sub(1);
                removed
            }
        };
        self.comment_count = self.comment_count.saturating_sub(1);
        Ok(removed)
    }

    /// Works out which page `thread` needs next.
    pub fn next_page_request(&self, thread: ThreadKey) -> Result<PageRequest> {
        let cursor = match thread {
            ThreadKey::Root => &self.roots,
            ThreadKey::Replies {
                parent_id,
                parent_level,
            } => {
                if parent_level >= MAX_LEVEL {
                    return Err(EngagementError::invariant(format!(
                        "replies below level {MAX_LEVEL} are never loaded"
                    )));
                }
                &self
                    .find_node(parent_id, parent_level)
                    .ok_or(EngagementError::StaleTree { id: parent_id })?
                    .replies
            }
        };
        Ok(PageRequest {
            thread,
            page: cursor.next_page(),
            size: cursor.page_size(),
        })
    }

    /// Applies a fetched page to the cursor it was requested for.
    /// Returns whether anything changed.
    pub fn apply_page(
        &mut self,
        thread: ThreadKey,
        page: CommentPage,
        viewer: Option<UserId>,
    ) -> Result<bool> {
        let reply_page_size = self.reply_page_size;
        let nodes: Vec<CommentNode> = page
            .items
            .into_iter()
            .map(|dto| CommentNode::from_dto(dto, viewer, reply_page_size))
            .collect();
        match thread {
            ThreadKey::Root => Ok(self.roots.append_page(nodes, page.total, page.page)),
            ThreadKey::Replies {
                parent_id,
                parent_level,
            } => {
                let parent = self
                    .find_node_mut(parent_id, parent_level)
                    .ok_or(EngagementError::StaleTree { id: parent_id })?;
                let applied = parent.replies.append_page(nodes, page.total, page.page);
                if applied {
                    parent.child_count = parent.replies.total();
                }
                Ok(applied)
            }
        }
    }

    /// Fetches and applies the next page of root comments in one blocking step.
    pub fn load_root_page(
        &mut self,
        service: &dyn CommentService,
        video_id: &str,
        viewer: Option<UserId>,
    ) -> anyhow::Result<bool> {
        self.load_page(service, video_id, ThreadKey::Root, viewer)
    }

    /// Fetches and applies the next page of replies under a comment.
    pub fn load_replies_page(
        &mut self,
        service: &dyn CommentService,
        video_id: &str,
        parent_id: CommentId,
        parent_level: u8,
        viewer: Option<UserId>,
    ) -> anyhow::Result<bool> {
        let thread = ThreadKey::Replies {
            parent_id,
            parent_level,
        };
        self.load_page(service, video_id, thread, viewer)
    }

    fn load_page(
        &mut self,
        service: &dyn CommentService,
        video_id: &str,
        thread: ThreadKey,
        viewer: Option<UserId>,
    ) -> anyhow::Result<bool> {
        let request = self.next_page_request(thread)?;
        let page = service
            .list_comments(video_id, request.parent_id(), request.page, request.size)
            .context("fetch comment page")?;
        Ok(self.apply_page(thread, page, viewer)?)
    }
}

fn find_in(items: &[CommentNode], id: CommentId, level: u8) -> Option<&CommentNode> {
    for node in items {
        if node.level < level {
            if let Some(found) = find_in(node.replies.items(), id, level) {
                return Some(found);
            }
        } else if node.level == level {
            if node.id == id {
                return Some(node);
            }
        } else {
            // Siblings share a level, so nothing here can be shallower.
            return None;
        }
    }
    None
}

fn find_in_mut(items: &mut [CommentNode], id: CommentId, level: u8) -> Option<&mut CommentNode> {
    for node in items.iter_mut() {
        if node.level < level {
            if let Some(found) = find_in_mut(node.replies.items_mut(), id, level) {
                return Some(found);
            }
        } else if node.level == level {
            if node.id == id {
                return Some(node);
            }
        } else {
            return None;
        }
    }
    None
}
