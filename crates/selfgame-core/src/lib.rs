//! selfgame core library
//!
//! Builds a role graph for a problem statement, routes signals across it,
//! dispatches work between agents and refines the answer in a bounded
//! self-play loop.
//!
//! ## Key Components
//!
//! - [`role_graph`]: executors, permissions and prompts, plus the requester
//! - [`routing`]: graph validation, forbidden-path policy, communication matrix
//! - [`dispatch`]: `select_next` over the matrix under an iteration bound
//! - [`self_play`]: GENERATE → CRITIQUE → CHECK → DECIDE
//! - [`session`]: one game end to end
//! - [`audit`]: digest-verified JSON export of a finished session

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod obs;
pub mod role_graph;
pub mod routing;
pub mod self_play;
pub mod session;
pub mod telemetry;
pub mod text;

pub use audit::{read_audit_artifact, write_audit_artifact, AgentSummary, AuditRecord};
pub use config::{
    CallPolicy, DispatchConfig, ForbiddenPathPolicy, GameConfig, KeywordPolicy, KeywordRule,
    RoleGraphConfig, RoutingConfig, ScorerMode, SelfPlayConfig,
};
pub use dispatch::{DispatchRecord, DispatchState, DynamicDispatcher};
pub use domain::{
    ActorOutput, Agent, AggregateQuality, ChunkStat, CriticDimension, Critique, DimensionScore,
    FallbackSource, GameError, GameResult, NoveltyReport, Result, SelfPlayRound, Stage, StageFailure,
    TerminationReason,
};
pub use role_graph::{validate_agents, RoleGraphBuilder};
pub use routing::{
    CommunicationMatrix, EdgeSet, InteractionGraph, RoutedGraph, RoutingConflict, SignalRouter,
};
pub use self_play::{Actor, Checker, CritiqueStats, Criticizer, SelfPlayEngine};
pub use session::GameSession;

/// Crate version, recorded in audit exports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
