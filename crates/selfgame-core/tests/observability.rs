//! Observability tests for game lifecycle tracing.
//!
//! The emitters must be callable under a live subscriber at every level
//! they use; `#[traced_test]` installs one per test.

use std::time::Duration;

use chrono::Utc;
use tracing::Instrument;
use tracing_test::traced_test;

use selfgame_collab::Collaborators;
use selfgame_core::obs::{
    emit_dispatch, emit_fallback_used, emit_game_finished, emit_round_finished,
    emit_routing_conflict, emit_session_built, session_span,
};
use selfgame_core::{
    ActorOutput, Agent, Critique, DynamicDispatcher, EdgeSet, GameConfig, NoveltyReport,
    RoutingConflict, SelfPlayEngine, SelfPlayRound, SignalRouter, TerminationReason,
};

fn sample_round() -> SelfPlayRound {
    SelfPlayRound {
        round_number: 1,
        actor_output: ActorOutput {
            agent: "lead".to_string(),
            content: "a draft".to_string(),
            fallback_used: false,
            duration: Duration::from_millis(12),
        },
        critique: Critique {
            critic: "reviewer".to_string(),
            dimension_scores: Vec::new(),
            overall_score: 0.6,
            satisfaction: false,
            satisfaction_score: 0.7,
            summary: "fine".to_string(),
            suggestions: Vec::new(),
            simulated: true,
            duration: Duration::ZERO,
        },
        novelty: NoveltyReport {
            novelty_score: 0.3,
            simulated: true,
            chunks: Vec::new(),
            duration: Duration::ZERO,
        },
        convergence_delta: 0.0,
        duration: Duration::from_millis(20),
        completed_at: Utc::now(),
    }
}

#[traced_test]
#[test]
fn test_emit_session_built() {
    emit_session_built("session-1", 4, 7, 0);
}

#[traced_test]
#[test]
fn test_emit_dispatch_with_and_without_target() {
    emit_dispatch(1, "requester", Some("lead"), "requester target");
    emit_dispatch(4, "lead", None, "iteration limit exceeded");
}

#[traced_test]
#[test]
fn test_emit_round_finished() {
    emit_round_finished(&sample_round());
}

#[traced_test]
#[test]
fn test_emit_game_finished() {
    emit_game_finished("session-1", TerminationReason::Converged, 3);
}

/// WARN-level events are captured by traced_test as well.
#[traced_test]
#[test]
fn test_warn_level_emitters() {
    emit_fallback_used("critic", "retries exhausted");
    emit_routing_conflict(&RoutingConflict::UnknownEndpoint {
        from: "lead".to_string(),
        to: "ghost".to_string(),
        set: EdgeSet::Allowed,
    });
}

#[traced_test]
#[tokio::test]
async fn test_game_runs_inside_session_span() {
    let config = GameConfig::default();
    let collaborators = Collaborators::none();
    let agents = vec![
        Agent::executor("lead", "manager", 0).with_priority(8),
        Agent::requester("Write a haiku", "lead", 1),
    ];
    let matrix = SignalRouter::new(&config, &collaborators).build_matrix(&agents);
    let mut dispatcher = DynamicDispatcher::new(agents, matrix, &config, &collaborators);
    let mut engine = SelfPlayEngine::new(&config, &collaborators);

    let session_id = uuid::Uuid::new_v4();
    let result = engine
        .run(session_id, "Write a haiku", &mut dispatcher)
        .instrument(session_span(&session_id.to_string()))
        .await;

    assert_eq!(result.session_id, session_id);
    assert!(!result.rounds.is_empty());
}
