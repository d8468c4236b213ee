//! Domain models for selfgame.
//!
//! - `Agent`: a requester or executor record in the interaction graph
//! - `SelfPlayRound` / `GameResult`: what a game produces
//! - `GameError`: the error taxonomy

pub mod agent;
pub mod digest;
pub mod error;
pub mod round;

pub use agent::{Agent, FallbackSource, DEFAULT_PRIORITY, PRIORITY_RANGE, REQUESTER_NAME};
pub use error::{GameError, Result};
pub use round::{
    ActorOutput, AggregateQuality, ChunkStat, CriticDimension, Critique, DimensionScore,
    GameResult, NoveltyReport, SelfPlayRound, Stage, StageFailure, TerminationReason,
};
