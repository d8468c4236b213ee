//! Structured observability hooks for game lifecycle events.
//!
//! This module provides:
//! - A session-scoped tracing span via [`session_span`]
//! - Emission functions for session build, dispatch, round and game events
//!
//! Lifecycle events are emitted at `info!`; fallbacks and routing conflicts
//! at `warn!` so they stand out when a backend misbehaves.

use tracing::{info, warn, Span};

use crate::domain::{SelfPlayRound, TerminationReason};
use crate::routing::RoutingConflict;

/// Session-scoped span. Futures run under it with
/// [`tracing::Instrument::instrument`] so every event carries `session_id`.
///
/// ```ignore
/// session.play().instrument(obs::session_span(&id)).await;
/// ```
pub fn session_span(session_id: &str) -> Span {
    tracing::info_span!("selfgame.session", session_id = %session_id)
}

/// Emit event: role graph built and routed.
pub fn emit_session_built(session_id: &str, agents: usize, edges: usize, conflicts: usize) {
    info!(
        event = "session.built",
        session_id = %session_id,
        agents = agents,
        edges = edges,
        conflicts = conflicts,
    );
}

/// Emit event: dispatcher picked (or failed to pick) the next agent.
pub fn emit_dispatch(iteration: u32, from: &str, to: Option<&str>, reason: &str) {
    info!(
        event = "dispatch.selected",
        iteration = iteration,
        from = %from,
        to = to.unwrap_or("-"),
        reason = %reason,
    );
}

/// Emit event: one self-play round appended.
pub fn emit_round_finished(round: &SelfPlayRound) {
    info!(
        event = "round.finished",
        round = round.round_number,
        agent = %round.actor_output.agent,
        overall_score = round.overall_score(),
        novelty_score = round.novelty_score(),
        convergence_delta = round.convergence_delta,
        simulated = round.simulated(),
        duration_ms = round.duration.as_millis() as u64,
    );
}

/// Emit event: game terminated.
pub fn emit_game_finished(session_id: &str, reason: TerminationReason, rounds: usize) {
    info!(
        event = "game.finished",
        session_id = %session_id,
        termination_reason = %reason,
        rounds = rounds,
    );
}

/// Emit event: a deterministic fallback replaced a collaborator result.
pub fn emit_fallback_used(call: &str, detail: &str) {
    warn!(event = "collab.fallback", call = %call, detail = %detail);
}

/// Emit event: the signal router reported a conflict.
pub fn emit_routing_conflict(conflict: &RoutingConflict) {
    warn!(event = "routing.conflict", conflict = %conflict);
}
