//! Domain-level error taxonomy for selfgame.

use crate::domain::round::Stage;

/// selfgame errors.
///
/// Collaborator failures never surface here directly: they are absorbed by
/// retry + fallback and show up only as `simulated` / `fallback_used` flags.
/// What remains are structural violations, loop limits and cancellation.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("stage {stage} produced no usable output in round {round}: {detail}")]
    MissingStage {
        stage: Stage,
        round: u32,
        detail: String,
    },

    #[error("iteration limit exceeded: {iteration_count} > {max_iterations}")]
    IterationLimitExceeded {
        iteration_count: u32,
        max_iterations: u32,
    },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("no dispatch candidates reachable from {from}")]
    NoCandidates { from: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("session cancelled")]
    Cancelled,

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for selfgame domain operations.
pub type Result<T> = std::result::Result<T, GameError>;
