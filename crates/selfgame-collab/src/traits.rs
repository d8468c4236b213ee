//! Collaborator trait definitions.
//!
//! Each external capability the game relies on (role proposal, permission
//! proposal, prompt composition, requirement judging, compatibility
//! scoring, generation, critique, embedding) is a narrow async trait: one
//! request type in, one response type out, `Err` on any failure. The core
//! never depends on a concrete backend, and every trait is optional; absent
//! collaborators are replaced by deterministic fallbacks in `selfgame-core`.
//!
//! In-memory fakes live in [`crate::fakes`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::schema::*;

#[async_trait]
pub trait RoleProposer: Send + Sync {
    /// Propose draft executor roles for a problem. Must never emit
    /// requester/user/client roles.
    async fn propose_roles(&self, request: &RoleProposalRequest) -> anyhow::Result<Vec<RoleDraft>>;
}

#[async_trait]
pub trait PermissionProposer: Send + Sync {
    async fn propose_permissions(
        &self,
        request: &PermissionProposalRequest,
    ) -> anyhow::Result<PermissionMap>;
}

#[async_trait]
pub trait PromptComposer: Send + Sync {
    /// Free-text system prompt: identity, duties, collaboration protocol,
    /// output contract, boundaries.
    async fn compose_prompt(&self, request: &PromptRequest) -> anyhow::Result<String>;
}

#[async_trait]
pub trait PriorityEstimator: Send + Sync {
    /// Estimate a priority level in 1..=10.
    async fn estimate_priority(&self, request: &PriorityRequest) -> anyhow::Result<i64>;
}

#[async_trait]
pub trait ForbiddenEdgeProposer: Send + Sync {
    async fn propose_forbidden(&self, request: &ForbiddenEdgeRequest)
        -> anyhow::Result<Vec<EdgeRef>>;
}

#[async_trait]
pub trait RequirementJudge: Send + Sync {
    async fn judge(&self, request: &RequirementRequest) -> anyhow::Result<RequirementSignature>;
}

#[async_trait]
pub trait CompatibilityScorer: Send + Sync {
    /// Compatibility in 0.0..=1.0.
    async fn score(&self, request: &CompatibilityRequest) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResponse>;
}

#[async_trait]
pub trait CriticBackend: Send + Sync {
    async fn critique(&self, request: &CritiqueRequest) -> anyhow::Result<CritiqueResponse>;
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embedding / hidden-state vector for one content chunk.
    async fn embed(&self, chunk: &str) -> anyhow::Result<Vec<f32>>;
}

/// The full set of optional collaborators for one session.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub role_proposer: Option<Arc<dyn RoleProposer>>,
    pub permission_proposer: Option<Arc<dyn PermissionProposer>>,
    pub prompt_composer: Option<Arc<dyn PromptComposer>>,
    pub priority_estimator: Option<Arc<dyn PriorityEstimator>>,
    pub forbidden_edge_proposer: Option<Arc<dyn ForbiddenEdgeProposer>>,
    pub requirement_judge: Option<Arc<dyn RequirementJudge>>,
    pub compatibility_scorer: Option<Arc<dyn CompatibilityScorer>>,
    pub generator: Option<Arc<dyn Generator>>,
    pub critic: Option<Arc<dyn CriticBackend>>,
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
}

impl Collaborators {
    /// No backends at all: every stage runs on its fallback.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_role_proposer(mut self, p: Arc<dyn RoleProposer>) -> Self {
        self.role_proposer = Some(p);
        self
    }

    pub fn with_permission_proposer(mut self, p: Arc<dyn PermissionProposer>) -> Self {
        self.permission_proposer = Some(p);
        self
    }

    pub fn with_prompt_composer(mut self, p: Arc<dyn PromptComposer>) -> Self {
        self.prompt_composer = Some(p);
        self
    }

    pub fn with_priority_estimator(mut self, p: Arc<dyn PriorityEstimator>) -> Self {
        self.priority_estimator = Some(p);
        self
    }

    pub fn with_forbidden_edge_proposer(mut self, p: Arc<dyn ForbiddenEdgeProposer>) -> Self {
        self.forbidden_edge_proposer = Some(p);
        self
    }

    pub fn with_requirement_judge(mut self, j: Arc<dyn RequirementJudge>) -> Self {
        self.requirement_judge = Some(j);
        self
    }

    pub fn with_compatibility_scorer(mut self, s: Arc<dyn CompatibilityScorer>) -> Self {
        self.compatibility_scorer = Some(s);
        self
    }

    pub fn with_generator(mut self, g: Arc<dyn Generator>) -> Self {
        self.generator = Some(g);
        self
    }

    pub fn with_critic(mut self, c: Arc<dyn CriticBackend>) -> Self {
        self.critic = Some(c);
        self
    }

    pub fn with_embedder(mut self, e: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(e);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("role_proposer", &self.role_proposer.is_some())
            .field("permission_proposer", &self.permission_proposer.is_some())
            .field("prompt_composer", &self.prompt_composer.is_some())
            .field("priority_estimator", &self.priority_estimator.is_some())
            .field("forbidden_edge_proposer", &self.forbidden_edge_proposer.is_some())
            .field("requirement_judge", &self.requirement_judge.is_some())
            .field("compatibility_scorer", &self.compatibility_scorer.is_some())
            .field("generator", &self.generator.is_some())
            .field("critic", &self.critic.is_some())
            .field("embedder", &self.embedder.is_some())
            .finish()
    }
}
