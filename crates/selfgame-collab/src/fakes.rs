//! In-memory fakes for collaborator traits (testing only)
//!
//! [`Scripted`] replays a queue of canned steps and implements every
//! collaborator trait for the matching response type. [`HashEmbedder`] is a
//! deterministic bag-of-tokens embedder: chunks sharing vocabulary get
//! similar vectors, which is enough to exercise novelty scoring.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::schema::*;
use crate::traits::*;

/// One scripted reaction.
#[derive(Debug, Clone)]
pub enum ScriptStep<T> {
    Respond(T),
    Fail(String),
    /// Never completes; exercises timeouts.
    Hang,
}

/// Replays steps in order. The last step repeats once the queue is down
/// to it, so `Scripted::always(x)` answers `x` forever.
#[derive(Debug)]
pub struct Scripted<T> {
    steps: Mutex<VecDeque<ScriptStep<T>>>,
    strict_flags: Mutex<Vec<bool>>,
}

impl<T: Clone> Scripted<T> {
    pub fn new(steps: Vec<ScriptStep<T>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            strict_flags: Mutex::new(Vec::new()),
        }
    }

    pub fn always(value: T) -> Self {
        Self::new(vec![ScriptStep::Respond(value)])
    }

    pub fn failing(message: &str) -> Self {
        Self::new(vec![ScriptStep::Fail(message.to_string())])
    }

    pub fn hanging() -> Self {
        Self::new(vec![ScriptStep::Hang])
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.strict_flags.lock().unwrap().len()
    }

    /// The `strict` flag of every request received, in order.
    pub fn strict_flags(&self) -> Vec<bool> {
        self.strict_flags.lock().unwrap().clone()
    }

    async fn next(&self, strict: bool) -> anyhow::Result<T> {
        self.strict_flags.lock().unwrap().push(strict);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };
        match step {
            Some(ScriptStep::Respond(value)) => Ok(value),
            Some(ScriptStep::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Err(anyhow::anyhow!("script exhausted")),
        }
    }
}

#[async_trait]
impl RoleProposer for Scripted<Vec<RoleDraft>> {
    async fn propose_roles(&self, request: &RoleProposalRequest) -> anyhow::Result<Vec<RoleDraft>> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl PermissionProposer for Scripted<PermissionMap> {
    async fn propose_permissions(
        &self,
        request: &PermissionProposalRequest,
    ) -> anyhow::Result<PermissionMap> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl PromptComposer for Scripted<String> {
    async fn compose_prompt(&self, request: &PromptRequest) -> anyhow::Result<String> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl PriorityEstimator for Scripted<i64> {
    async fn estimate_priority(&self, _request: &PriorityRequest) -> anyhow::Result<i64> {
        self.next(false).await
    }
}

#[async_trait]
impl ForbiddenEdgeProposer for Scripted<Vec<EdgeRef>> {
    async fn propose_forbidden(
        &self,
        request: &ForbiddenEdgeRequest,
    ) -> anyhow::Result<Vec<EdgeRef>> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl RequirementJudge for Scripted<RequirementSignature> {
    async fn judge(&self, request: &RequirementRequest) -> anyhow::Result<RequirementSignature> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl CompatibilityScorer for Scripted<f64> {
    async fn score(&self, _request: &CompatibilityRequest) -> anyhow::Result<f64> {
        self.next(false).await
    }
}

#[async_trait]
impl Generator for Scripted<GenerationResponse> {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResponse> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl CriticBackend for Scripted<CritiqueResponse> {
    async fn critique(&self, request: &CritiqueRequest) -> anyhow::Result<CritiqueResponse> {
        self.next(request.strict).await
    }
}

#[async_trait]
impl EmbeddingBackend for Scripted<Vec<f32>> {
    async fn embed(&self, _chunk: &str) -> anyhow::Result<Vec<f32>> {
        self.next(false).await
    }
}

/// Deterministic hashed bag-of-tokens embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed(&self, chunk: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        for token in chunk.split_whitespace() {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u16::from_le_bytes([digest[0], digest[1]]) as usize % self.dims;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

/// A critique with every canonical dimension at `score` (0..=10 scale).
pub fn uniform_critique(score: f64) -> CritiqueResponse {
    let dimension_scores = [
        "innovation",
        "logic",
        "completeness",
        "feasibility",
        "quality",
        "relevance",
    ]
    .iter()
    .map(|d| RawDimensionScore {
        dimension: d.to_string(),
        score,
        reasoning: format!("scripted {d} score"),
        suggestions: vec![format!("improve {d}")],
    })
    .collect();

    CritiqueResponse {
        dimension_scores,
        overall_score: Some(score),
        summary_critique: format!("scripted critique at {score}"),
        improvement_suggestions: vec!["tighten the argument".to_string()],
    }
}

/// A minimal valid role draft.
pub fn role_draft(name: &str, role_type: &str, priority: i64, skills: &[&str]) -> RoleDraft {
    RoleDraft {
        name: name.to_string(),
        role_type: role_type.to_string(),
        responsibilities: vec![format!("deliver {role_type} work")],
        skills: skills.iter().map(|s| s.to_string()).collect(),
        output_requirements: format!("{role_type} report"),
        priority_level: Some(priority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_last_step_repeats() {
        let scripted: Scripted<i64> =
            Scripted::new(vec![ScriptStep::Fail("first".into()), ScriptStep::Respond(4)]);
        let req = PriorityRequest {
            problem_statement: String::new(),
            role: RoleDraft::default(),
        };
        assert!(scripted.estimate_priority(&req).await.is_err());
        assert_eq!(scripted.estimate_priority(&req).await.unwrap(), 4);
        assert_eq!(scripted.estimate_priority(&req).await.unwrap(), 4);
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed("alpha beta gamma").await.unwrap();
        let b = embedder.embed("alpha beta gamma").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_eq!(a.iter().sum::<f32>(), 3.0);
    }
}
