//! selfgame-collab: pluggable collaborator contracts
//!
//! Everything the game asks of the outside world (language-model structured
//! output, embeddings) goes through the traits defined here. This crate
//! also owns the guard every call runs under: a bounded timeout, a bounded
//! retry count and session cancellation.
//!
//! ## Key Components
//!
//! - [`traits`]: one async trait per collaborator, plus [`Collaborators`]
//! - [`schema`]: request/response records
//! - [`call`]: [`call_with_retry`] and [`CallPolicy`]
//! - [`cancel`]: [`CancelHandle`] / [`CancelSignal`]
//! - [`fakes`]: scripted in-memory collaborators for tests

pub mod call;
pub mod cancel;
mod error;
pub mod fakes;
pub mod schema;
pub mod traits;

pub use call::{call_with_retry, Attempt, CallPolicy, DEFAULT_TIMEOUT_MS};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::{CollabError, CollabResult};
pub use schema::{
    CompatibilityRequest, CritiqueRequest, CritiqueResponse, DomainConfig, EdgeRef,
    ForbiddenEdgeRequest, GenerationRequest, GenerationResponse, PermissionMap,
    PermissionProposalRequest, PreviousCritique, PriorityRequest, PromptRequest,
    RawDimensionScore, RequirementRequest, RequirementSignature, RoleDraft, RoleProposalRequest,
};
pub use traits::{
    Collaborators, CompatibilityScorer, CriticBackend, EmbeddingBackend, ForbiddenEdgeProposer,
    Generator, PermissionProposer, PriorityEstimator, PromptComposer, RequirementJudge,
    RoleProposer,
};
