//! Error taxonomy for the conversation engine.

use thiserror::Error;

/// Errors produced by the engine and its collaborators.
///
/// Network failures reach the user as a dismissible notice. Persistence
/// failures never do; inside a session they are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The named conversation does not exist.
    #[error("conversation '{0}' not found")]
    NotFound(String),

    /// A prompt is already waiting for its answer or still being revealed.
    #[error("the assistant is still answering the previous question")]
    Busy,

    /// Submitted prompt was blank after trimming.
    #[error("prompt is empty")]
    EmptyPrompt,

    /// The answer or suggestion service could not be reached or returned a
    /// non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// Reading or writing session state failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Network(err.to_string())
    }
}

impl EngineError {
    /// Whether the error should be shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, EngineError::Persistence(_))
    }
}
