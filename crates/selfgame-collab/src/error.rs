//! Error types for collaborator calls.

use thiserror::Error;

/// Failure of a guarded collaborator call.
///
/// Backend failures are opaque (`anyhow`) and flattened into a message here;
/// callers only need to know *that* a call failed and whether the session
/// was cancelled while it was in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    /// The call did not complete within the configured timeout.
    #[error("{call} timed out after {timeout_ms}ms")]
    Timeout { call: &'static str, timeout_ms: u64 },

    /// The backend returned an error or output that failed validation.
    #[error("{call} failed: {message}")]
    Failed { call: &'static str, message: String },

    /// Every attempt failed.
    #[error("{call} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        call: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// No backend is configured for this call.
    #[error("no backend configured for {call}")]
    Unavailable { call: &'static str },

    /// The session was cancelled while the call was pending.
    #[error("{call} cancelled")]
    Cancelled { call: &'static str },
}

impl CollabError {
    /// `true` when the failure was caused by session cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollabError::Cancelled { .. })
    }

    /// Name of the collaborator call that failed.
    pub fn call(&self) -> &'static str {
        match self {
            CollabError::Timeout { call, .. }
            | CollabError::Failed { call, .. }
            | CollabError::RetriesExhausted { call, .. }
            | CollabError::Unavailable { call }
            | CollabError::Cancelled { call } => call,
        }
    }
}

/// Result type for guarded collaborator calls.
pub type CollabResult<T> = std::result::Result<T, CollabError>;
