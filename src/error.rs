use crate::comments::CommentId;

pub type Result<T> = std::result::Result<T, EngagementError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngagementError {
    /// The targeted comment is no longer addressable (deleted or paginated out).
    #[error("comment {id} is no longer available, please retry")]
    StaleTree { id: CommentId },
    #[error("{action} failed: {message}")]
    RemoteCall {
        action: &'static str,
        message: String,
    },
    /// Raised for mutations correct UI wiring never produces.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("no video is open")]
    NoActiveVideo,
    #[error("sign in to comment")]
    NotSignedIn,
    #[error("please write a comment")]
    EmptyContent,
}

impl EngagementError {
    pub fn remote(action: &'static str, err: &anyhow::Error) -> Self {
        EngagementError::RemoteCall {
            action,
            message: format!("{err:#}"),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        EngagementError::InvariantViolation(message.into())
    }

    /// Failures a user can fix by retrying, as opposed to wiring bugs.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngagementError::StaleTree { .. } | EngagementError::RemoteCall { .. }
        )
    }
}
