//! Game session: threads config, collaborators, cancellation, graph and
//! dispatch state through role building, routing, dispatch and self-play.

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use selfgame_collab::{CancelSignal, Collaborators, DomainConfig};

use crate::audit::{self, AgentSummary, AuditRecord};
use crate::config::GameConfig;
use crate::dispatch::{DispatchRecord, DynamicDispatcher};
use crate::domain::{Agent, GameResult, Result};
use crate::obs;
use crate::role_graph::RoleGraphBuilder;
use crate::routing::{InteractionGraph, RoutingConflict, SignalRouter};
use crate::self_play::{CritiqueStats, SelfPlayEngine};

/// One game, from problem statement to result. Owns all of its state;
/// sessions share nothing.
pub struct GameSession {
    session_id: Uuid,
    problem_statement: String,
    graph: InteractionGraph,
    conflicts: Vec<RoutingConflict>,
    routing_fallback_used: bool,
    dispatcher: DynamicDispatcher,
    engine: SelfPlayEngine,
}

impl GameSession {
    /// Validate the config, build and route the role graph, and prepare the
    /// dispatcher and engine.
    pub async fn build(
        problem_statement: &str,
        domain: DomainConfig,
        config: GameConfig,
        collaborators: Collaborators,
        cancel: CancelSignal,
    ) -> Result<Self> {
        config.validate()?;
        let session_id = Uuid::new_v4();
        let span = obs::session_span(&session_id.to_string());

        async move {
            let agents = RoleGraphBuilder::new(&config, &collaborators)
                .with_cancel(cancel.clone())
                .build(problem_statement, &domain)
                .await?;

            let routed = SignalRouter::new(&config, &collaborators)
                .with_cancel(cancel.clone())
                .route(agents)
                .await?;

            obs::emit_session_built(
                &session_id.to_string(),
                routed.graph.agents().len(),
                routed.matrix.edge_count(),
                routed.conflicts.len(),
            );

            let dispatcher = DynamicDispatcher::new(
                routed.graph.agents().to_vec(),
                routed.matrix,
                &config,
                &collaborators,
            )
            .with_cancel(cancel.clone());
            let engine = SelfPlayEngine::new(&config, &collaborators).with_cancel(cancel);

            Ok(Self {
                session_id,
                problem_statement: problem_statement.to_string(),
                graph: routed.graph,
                conflicts: routed.conflicts,
                routing_fallback_used: routed.fallback_used,
                dispatcher,
                engine,
            })
        }
        .instrument(span)
        .await
    }

    /// Run the self-play game. Always returns a well-formed result.
    pub async fn play(&mut self) -> GameResult {
        let span = obs::session_span(&self.session_id.to_string());
        self.engine
            .run(self.session_id, &self.problem_statement, &mut self.dispatcher)
            .instrument(span)
            .await
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn agents(&self) -> &[Agent] {
        self.graph.agents()
    }

    pub fn graph(&self) -> &InteractionGraph {
        &self.graph
    }

    pub fn conflicts(&self) -> &[RoutingConflict] {
        &self.conflicts
    }

    pub fn dispatcher(&self) -> &DynamicDispatcher {
        &self.dispatcher
    }

    pub fn dispatch_history(&self) -> &[DispatchRecord] {
        self.dispatcher.history()
    }

    pub fn critique_stats(&self) -> CritiqueStats {
        self.engine.critique_stats()
    }

    /// Snapshot the session and `result` for export.
    pub fn audit(&self, result: &GameResult) -> Result<AuditRecord> {
        let matrix = self.dispatcher.matrix();
        let dispatch_history = self.dispatcher.history().to_vec();
        let content_digest =
            audit::content_digest(&dispatch_history, &result.rounds, result.termination_reason)?;

        Ok(AuditRecord {
            version: crate::VERSION.to_string(),
            session_id: self.session_id,
            problem_statement: self.problem_statement.clone(),
            agents: self.graph.agents().iter().map(summarize).collect(),
            allowed_edges: self.graph.allowed_edges().iter().cloned().collect(),
            forbidden_edges: self.graph.forbidden_edges().iter().cloned().collect(),
            matrix_names: matrix.names().to_vec(),
            matrix_rows: matrix.rows().to_vec(),
            conflicts: self.conflicts.clone(),
            routing_fallback_used: self.routing_fallback_used,
            dispatch_history,
            rounds: result.rounds.clone(),
            termination_reason: result.termination_reason,
            aggregate_quality: result.aggregate_quality.clone(),
            stage_failure: result.stage_failure.clone(),
            critique_stats: self.engine.critique_stats(),
            exported_at: Utc::now(),
            content_digest,
        })
    }
}

fn summarize(agent: &Agent) -> AgentSummary {
    AgentSummary {
        name: agent.name().to_string(),
        role_type: agent.role_type().to_string(),
        priority_level: agent.priority_level(),
        is_requester: agent.is_requester(),
        skills: agent.skills().iter().cloned().collect(),
        connection_permissions: agent.connection_permissions().iter().cloned().collect(),
        fallback_used: agent.fallback_used(),
        fallback_sources: agent.fallback_sources().iter().copied().collect(),
    }
}
