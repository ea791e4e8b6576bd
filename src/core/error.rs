use thiserror::Error;

use crate::services::StoreError;

/// Failures surfaced by the dialogue core
///
/// Every variant except `StoreUnavailable` is an expected outcome of user
/// input and is answered with an informational message.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("User {0} has no committed profile")]
    NotRegistered(String),

    #[error("User {0} already has a committed profile")]
    AlreadyRegistered(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No match found")]
    NoMatch,

    #[error("No active conversation for user {0}")]
    NoActiveConversation(String),

    #[error("User {0} is already in a conversation")]
    AlreadyInConversation(String),

    #[error("Candidate {0} is no longer available")]
    PartnerUnavailable(String),

    #[error("User {requester} may not view profile {target}")]
    Forbidden { requester: String, target: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl DialogueError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        DialogueError::InvalidInput(reason.into())
    }
}
