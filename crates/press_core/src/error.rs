use thiserror::Error;

/// Why a user action did not go through. The `Display` text is what the
/// user sees in the notice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("you must be signed in to do that")]
    NotSignedIn,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("file is too large (maximum {max_bytes} bytes)")]
    FileTooLarge { size_bytes: usize, max_bytes: usize },
    #[error("action cancelled")]
    Cancelled,
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Raw message from the identity, document or blob collaborator.
    #[error("{0}")]
    Collaborator(String),
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        ActionError::Collaborator(err.to_string())
    }
}
