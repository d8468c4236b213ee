//! The self-play loop: GENERATE → CRITIQUE → CHECK → DECIDE.
//!
//! - [`Actor`] produces round content
//! - [`Criticizer`] scores it on six dimensions
//! - [`Checker`] measures novelty
//! - [`decide`] applies the termination conditions
//! - [`SelfPlayEngine`] drives rounds and dispatch

pub mod actor;
pub mod checker;
pub mod criticizer;
pub mod decide;
pub mod engine;

pub use actor::{Actor, GenerationContext};
pub use checker::Checker;
pub use criticizer::{select_critic, CritiqueStats, Criticizer};
pub use decide::decide;
pub use engine::SelfPlayEngine;

use selfgame_collab::CollabError;
use tracing::debug;

use crate::domain::{GameError, Result, Stage};
use crate::obs;

/// Handle a collaborator failure inside a stage.
///
/// Cancellation propagates. In strict mode the stage is missing; otherwise
/// the failure is logged and the caller uses its fallback.
pub(crate) fn absorb_failure(err: CollabError, stage: Stage, round: u32, strict: bool) -> Result<()> {
    if err.is_cancelled() {
        return Err(GameError::Cancelled);
    }
    if strict {
        return Err(GameError::MissingStage {
            stage,
            round,
            detail: err.to_string(),
        });
    }
    obs::emit_fallback_used(err.call(), &err.to_string());
    Ok(())
}

/// Handle an unconfigured collaborator: missing in strict mode, fallback
/// otherwise.
pub(crate) fn missing_collaborator(
    call: &'static str,
    stage: Stage,
    round: u32,
    strict: bool,
) -> Result<()> {
    if strict {
        return Err(GameError::MissingStage {
            stage,
            round,
            detail: CollabError::Unavailable { call }.to_string(),
        });
    }
    debug!(call, round, "collaborator not configured; using fallback");
    Ok(())
}
