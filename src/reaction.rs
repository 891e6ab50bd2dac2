use serde::{Deserialize, Serialize};

/// The viewer's reaction to a video. Like and dislike are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    #[default]
    None,
    Liked,
    Disliked,
}

/// What the server is asked to do, derived from the state before a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionAction {
    Like,
    CancelLike,
    Dislike,
    CancelDislike,
}

impl ReactionAction {
    /// Numeric `updateType` the video endpoint expects.
    pub fn update_type(self) -> u8 {
        match self {
            ReactionAction::Like => 1,
            ReactionAction::Dislike => 2,
            ReactionAction::CancelLike => 3,
            ReactionAction::CancelDislike => 4,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ReactionAction::Like => "Liked",
            ReactionAction::CancelLike => "Removed like from",
            ReactionAction::Dislike => "Disliked",
            ReactionAction::CancelDislike => "Removed dislike from",
        }
    }
}

/// An applied optimistic toggle, kept until the remote call settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReaction {
    pub action: ReactionAction,
    pub previous: Reaction,
    pub requested: Reaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReactionState {
    reaction: Reaction,
    like_count: u64,
    dislike_count: u64,
}

impl ReactionState {
    pub fn new(reaction: Reaction, like_count: u64, dislike_count: u64) -> Self {
        Self {
            reaction,
            like_count,
            dislike_count,
        }
    }

    pub fn reaction(&self) -> Reaction {
        self.reaction
    }

    pub fn liked(&self) -> bool {
        self.reaction == Reaction::Liked
    }

    pub fn disliked(&self) -> bool {
        self.reaction == Reaction::Disliked
    }

    pub fn like_count(&self) -> u64 {
        self.like_count
    }

    pub fn dislike_count(&self) -> u64 {
        self.dislike_count
    }

    pub fn toggle_like(&mut self) -> PendingReaction {
        let (action, target) = if self.liked() {
            (ReactionAction::CancelLike, Reaction::None)
        } else {
            (ReactionAction::Like, Reaction::Liked)
        };
        self.apply(action, target)
    }

    pub fn toggle_dislike(&mut self) -> PendingReaction {
        let (action, target) = if self.disliked() {
            (ReactionAction::CancelDislike, Reaction::None)
        } else {
            (ReactionAction::Dislike, Reaction::Disliked)
        };
        self.apply(action, target)
    }

    /// Reverts a failed toggle. Does nothing if a later toggle already moved
    /// the state elsewhere, since that toggle owns the current counts.
    pub fn rollback(&mut self, pending: &PendingReaction) -> bool {
        if self.reaction != pending.requested {
            return false;
        }
        self.transition(pending.previous);
        true
    }

    fn apply(&mut self, action: ReactionAction, target: Reaction) -> PendingReaction {
        let previous = self.reaction;
        self.transition(target);
        PendingReaction {
            action,
            previous,
            requested: target,
        }
    }

    fn transition(&mut self, target: Reaction) {
        match self.reaction {
            Reaction::Liked => self.like_count = self.like_count.saturating_sub(1),
            Reaction::Disliked => self.dislike_count = self.dislike_count.saturating_sub(1),
            Reaction::None => {}
        }
        match target {
            Reaction::Liked => self.like_count += 1,
            Reaction::Disliked => self.dislike_count += 1,
            Reaction::None => {}
        }
        self.reaction = target;
    }
}
