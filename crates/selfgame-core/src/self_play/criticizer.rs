//! CRITIQUE stage: six-dimension scoring with a seeded simulated fallback.
//!
//! Backend scores may come on either a 0..=1 or a 0..=10 scale. A response
//! with any score above 1.0 is read as 0..=10 and divided by ten; scores
//! outside 0..=10 make the response malformed. Every dimension must be
//! present. The backend's own overall score is ignored in favour of the
//! weighted mean of the dimensions.
//!
//! In panel mode every executor except the author critiques concurrently.
//! Failed critiques are dropped and the rest are averaged per dimension.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use selfgame_collab::{
    call_with_retry, CallPolicy, CancelSignal, CriticBackend, CritiqueRequest, CritiqueResponse,
    PreviousCritique,
};

use crate::config::{KeywordPolicy, SelfPlayConfig};
use crate::domain::agent::by_priority_then_order;
use crate::domain::digest::seeded_unit;
use crate::domain::{Agent, CriticDimension, Critique, DimensionScore, GameError, Result, Stage};
use crate::self_play::{absorb_failure, missing_collaborator};
use crate::text;

/// Baseline profile of the simulated critique.
const SIMULATED_BASE: [(CriticDimension, f64); 6] = [
    (CriticDimension::Innovation, 0.70),
    (CriticDimension::Logic, 0.75),
    (CriticDimension::Completeness, 0.68),
    (CriticDimension::Feasibility, 0.72),
    (CriticDimension::Quality, 0.73),
    (CriticDimension::Relevance, 0.80),
];
const SIMULATED_JITTER: f64 = 0.05;
const BASE_SATISFACTION: f64 = 0.7;
const PREVIOUS_IN_REQUEST: usize = 2;

/// Running statistics over every critique produced in a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CritiqueStats {
    pub total: usize,
    pub simulated: usize,
    pub mean_overall: f64,
    pub mean_satisfaction: f64,
    pub mean_duration_ms: f64,
}

pub struct Criticizer {
    backend: Option<Arc<dyn CriticBackend>>,
    calls: CallPolicy,
    cancel: CancelSignal,
    config: SelfPlayConfig,
    seed: u64,
    history: Vec<(u32, Critique)>,
}

impl Criticizer {
    pub fn new(
        backend: Option<Arc<dyn CriticBackend>>,
        calls: CallPolicy,
        config: SelfPlayConfig,
        seed: u64,
    ) -> Self {
        Self {
            backend,
            calls,
            cancel: CancelSignal::never(),
            config,
            seed,
            history: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Score `content` for `round` from the perspective of `critic`.
    pub async fn evaluate(
        &mut self,
        round: u32,
        content: &str,
        problem_statement: &str,
        critic: &Agent,
    ) -> Result<Critique> {
        let started = Instant::now();
        let strict = self.config.strict_stages;

        let parsed = match &self.backend {
            Some(backend) => {
                let request = self.request(round, content, problem_statement, critic);
                match call_backend(backend.as_ref(), &request, &self.calls, &self.cancel).await {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        absorb_failure(e, Stage::Critique, round, strict)?;
                        None
                    }
                }
            }
            None => {
                missing_collaborator("critic", Stage::Critique, round, strict)?;
                None
            }
        };

        let simulated = parsed.is_none();
        let parsed = parsed.unwrap_or_else(|| simulated_critique(self.seed, content, &self.config));
        Ok(self.record(round, critic.name().to_string(), parsed, simulated, started))
    }

    /// Score `content` with a panel of every executor except `author`.
    ///
    /// Critiques run concurrently; failures are dropped and the survivors
    /// are averaged into one history entry whose `critic` lists them. With
    /// fewer than two panel members, or no backend, this is [`evaluate`]
    /// with a single critic. Only when every panel critique fails does the
    /// stage fall back (or go missing in strict mode).
    ///
    /// [`evaluate`]: Criticizer::evaluate
    pub async fn evaluate_panel(
        &mut self,
        round: u32,
        content: &str,
        problem_statement: &str,
        agents: &[Agent],
        author: &Agent,
    ) -> Result<Critique> {
        let panel = panel_critics(agents, author);
        let Some(backend) = self.backend.clone().filter(|_| panel.len() > 1) else {
            let critic = panel.first().copied().unwrap_or(author);
            return self.evaluate(round, content, problem_statement, critic).await;
        };

        let started = Instant::now();
        let requests: Vec<CritiqueRequest> = panel
            .iter()
            .map(|critic| self.request(round, content, problem_statement, critic))
            .collect();
        let outcomes = join_all(
            requests
                .iter()
                .map(|request| call_backend(backend.as_ref(), request, &self.calls, &self.cancel)),
        )
        .await;

        let mut kept = Vec::new();
        let mut names = Vec::new();
        let mut last_error = None;
        for (critic, outcome) in panel.iter().zip(outcomes) {
            match outcome {
                Ok(parsed) => {
                    names.push(critic.name());
                    kept.push(parsed);
                }
                Err(e) if e.is_cancelled() => return Err(GameError::Cancelled),
                Err(e) => {
                    warn!(round, critic = %critic.name(), error = %e, "critique dropped from panel");
                    last_error = Some(e);
                }
            }
        }
        debug!(round, kept = kept.len(), asked = panel.len(), "critic panel finished");

        if let Some(merged) = merge_panel(kept) {
            return Ok(self.record(round, names.join(", "), merged, false, started));
        }
        if let Some(e) = last_error {
            absorb_failure(e, Stage::Critique, round, self.config.strict_stages)?;
        }
        let label = panel.first().map_or(author.name(), |a| a.name()).to_string();
        let parsed = simulated_critique(self.seed, content, &self.config);
        Ok(self.record(round, label, parsed, true, started))
    }

    /// Weight `parsed` into a [`Critique`] and append it to the history.
    fn record(
        &mut self,
        round: u32,
        critic: String,
        parsed: ParsedCritique,
        simulated: bool,
        started: Instant,
    ) -> Critique {
        let overall_score = weighted_overall(&self.config, &parsed.dimension_scores);
        let previous = self.history.last().map(|(_, c)| c);
        let critique = Critique {
            critic,
            satisfaction_score: satisfaction_score(previous, &parsed.dimension_scores),
            dimension_scores: parsed.dimension_scores,
            overall_score,
            satisfaction: overall_score >= self.config.quality_threshold,
            summary: parsed.summary,
            suggestions: parsed.suggestions,
            simulated,
            duration: started.elapsed(),
        };
        self.history.push((round, critique.clone()));
        critique
    }

    fn request(
        &self,
        round: u32,
        content: &str,
        problem_statement: &str,
        critic: &Agent,
    ) -> CritiqueRequest {
        let skip = self.history.len().saturating_sub(PREVIOUS_IN_REQUEST);
        CritiqueRequest {
            round,
            content: content.to_string(),
            problem_statement: problem_statement.to_string(),
            critic_name: critic.name().to_string(),
            critic_role_type: critic.role_type().to_string(),
            critic_prompt: critic.system_prompt().to_string(),
            dimensions: CriticDimension::ALL.iter().map(|d| d.key().to_string()).collect(),
            previous: self.history[skip..]
                .iter()
                .map(|(r, c)| PreviousCritique {
                    round: *r,
                    overall_score: c.overall_score,
                    summary: c.summary.clone(),
                })
                .collect(),
            strict: false,
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Critique> {
        self.history.iter().map(|(_, c)| c)
    }

    pub fn latest_critique(&self) -> Option<&Critique> {
        self.history.last().map(|(_, c)| c)
    }

    /// Forget earlier critiques: the next one starts from base satisfaction
    /// and carries no previous rounds.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn stats(&self) -> CritiqueStats {
        let total = self.history.len();
        if total == 0 {
            return CritiqueStats::default();
        }
        let n = total as f64;
        let sum = |f: fn(&Critique) -> f64| self.history.iter().map(|(_, c)| f(c)).sum::<f64>();
        CritiqueStats {
            total,
            simulated: self.history.iter().filter(|(_, c)| c.simulated).count(),
            mean_overall: sum(|c| c.overall_score) / n,
            mean_satisfaction: sum(|c| c.satisfaction_score) / n,
            mean_duration_ms: sum(|c| c.duration.as_secs_f64() * 1000.0) / n,
        }
    }
}

/// Critique content ready to be weighted.
#[derive(Debug, Clone, PartialEq)]
struct ParsedCritique {
    dimension_scores: Vec<DimensionScore>,
    summary: String,
    suggestions: Vec<String>,
}

async fn call_backend(
    backend: &dyn CriticBackend,
    request: &CritiqueRequest,
    calls: &CallPolicy,
    cancel: &CancelSignal,
) -> selfgame_collab::CollabResult<ParsedCritique> {
    call_with_retry("critic", calls, cancel, |attempt| {
        let request = CritiqueRequest {
            strict: attempt.strict,
            ..request.clone()
        };
        async move { parse_response(backend.critique(&request).await?) }
    })
    .await
}

fn parse_response(response: CritiqueResponse) -> anyhow::Result<ParsedCritique> {
    let mut found: BTreeMap<CriticDimension, (f64, String, Vec<String>)> = BTreeMap::new();
    for raw in response.dimension_scores {
        let Some(dimension) = CriticDimension::parse(&raw.dimension) else {
            continue;
        };
        if !raw.score.is_finite() || !(0.0..=10.0).contains(&raw.score) {
            bail!("{} score {} outside 0..=10", dimension, raw.score);
        }
        found
            .entry(dimension)
            .or_insert((raw.score, raw.reasoning, raw.suggestions));
    }
    if let Some(missing) = CriticDimension::ALL.iter().find(|d| !found.contains_key(*d)) {
        bail!("critique is missing dimension {missing}");
    }

    let ten_point = found.values().any(|(score, _, _)| *score > 1.0);
    let scale = if ten_point { 10.0 } else { 1.0 };
    let dimension_scores: Vec<DimensionScore> = found
        .into_iter()
        .map(|(dimension, (score, reasoning, suggestions))| DimensionScore {
            dimension,
            score: score / scale,
            reasoning,
            suggestions,
        })
        .collect();

    let suggestions = if response.improvement_suggestions.is_empty() {
        dimension_scores
            .iter()
            .flat_map(|d| d.suggestions.iter().cloned())
            .collect()
    } else {
        response.improvement_suggestions
    };
    Ok(ParsedCritique {
        dimension_scores,
        summary: response.summary_critique,
        suggestions,
    })
}

/// Per-dimension mean of the panel's critiques; `None` for an empty panel.
fn merge_panel(parsed: Vec<ParsedCritique>) -> Option<ParsedCritique> {
    if parsed.is_empty() {
        return None;
    }
    let n = parsed.len() as f64;
    let dimension_scores = CriticDimension::ALL
        .iter()
        .map(|&dimension| {
            let entries: Vec<&DimensionScore> = parsed
                .iter()
                .filter_map(|p| p.dimension_scores.iter().find(|d| d.dimension == dimension))
                .collect();
            DimensionScore {
                dimension,
                score: entries.iter().map(|d| d.score).sum::<f64>() / n,
                reasoning: entries
                    .iter()
                    .map(|d| d.reasoning.as_str())
                    .filter(|r| !r.is_empty())
                    .collect::<Vec<_>>()
                    .join("; "),
                suggestions: entries.iter().flat_map(|d| d.suggestions.iter().cloned()).collect(),
            }
        })
        .collect();

    let mut suggestions: Vec<String> = Vec::new();
    for suggestion in parsed.iter().flat_map(|p| p.suggestions.iter()) {
        if !suggestions.contains(suggestion) {
            suggestions.push(suggestion.clone());
        }
    }
    let summary = parsed
        .iter()
        .map(|p| p.summary.as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Some(ParsedCritique {
        dimension_scores,
        summary,
        suggestions,
    })
}

/// Base profile plus a jitter derived from `seed` and `content`.
fn simulated_critique(seed: u64, content: &str, config: &SelfPlayConfig) -> ParsedCritique {
    let dimension_scores: Vec<DimensionScore> = SIMULATED_BASE
        .iter()
        .map(|&(dimension, base)| {
            let unit = seeded_unit(seed, &[b"critique", content.as_bytes(), dimension.key().as_bytes()]);
            let score = (base + (unit * 2.0 - 1.0) * SIMULATED_JITTER).clamp(0.0, 1.0);
            DimensionScore {
                dimension,
                score,
                reasoning: "simulated score".to_string(),
                suggestions: Vec::new(),
            }
        })
        .collect();
    let suggestions = dimension_scores
        .iter()
        .filter(|d| d.score < config.quality_threshold)
        .map(|d| format!("strengthen {}", d.dimension))
        .collect();
    ParsedCritique {
        dimension_scores,
        summary: "simulated critique: no critic backend result".to_string(),
        suggestions,
    }
}

/// Weighted mean of the dimension scores.
pub fn weighted_overall(config: &SelfPlayConfig, scores: &[DimensionScore]) -> f64 {
    let (mut total, mut weights) = (0.0, 0.0);
    for score in scores {
        let w = config.weight_for(score.dimension);
        total += w * score.score;
        weights += w;
    }
    if weights <= 0.0 {
        return 0.0;
    }
    (total / weights).clamp(0.0, 1.0)
}

/// `0.7 + mean per-dimension improvement` over the previous critique.
pub fn satisfaction_score(previous: Option<&Critique>, scores: &[DimensionScore]) -> f64 {
    let Some(previous) = previous else {
        return BASE_SATISFACTION;
    };
    let deltas: Vec<f64> = scores
        .iter()
        .filter_map(|s| previous.score_for(s.dimension).map(|p| s.score - p))
        .collect();
    if deltas.is_empty() {
        return BASE_SATISFACTION;
    }
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    (BASE_SATISFACTION + mean).clamp(0.0, 1.0)
}

/// Critic persona for a round: a reviewer-like executor other than the
/// actor, else the highest-priority other executor, else the actor.
pub fn select_critic<'a>(agents: &'a [Agent], actor: &'a Agent, keywords: &KeywordPolicy) -> &'a Agent {
    let mut others: Vec<&Agent> = agents
        .iter()
        .filter(|a| a.is_executor() && a.name() != actor.name())
        .collect();
    others.sort_by(|a, b| by_priority_then_order(a, b));
    others
        .iter()
        .copied()
        .find(|a| text::find_keyword(&a.identity_text(), &keywords.reviewer).is_some())
        .or_else(|| others.first().copied())
        .unwrap_or(actor)
}

/// Panel for a round: every executor except `author`, by priority then
/// creation order.
pub fn panel_critics<'a>(agents: &'a [Agent], author: &Agent) -> Vec<&'a Agent> {
    let mut panel: Vec<&Agent> = agents
        .iter()
        .filter(|a| a.is_executor() && a.name() != author.name())
        .collect();
    panel.sort_by(|a, b| by_priority_then_order(a, b));
    panel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use selfgame_collab::fakes::{uniform_critique, Scripted};
    use selfgame_collab::RawDimensionScore;

    fn critic() -> Agent {
        Agent::executor("reviewer", "qa reviewer", 1)
    }

    /// Scores by critic name; critics missing from the table fail.
    #[derive(Default)]
    struct PerCritic {
        scores: BTreeMap<String, f64>,
        asked: Mutex<Vec<String>>,
    }

    impl PerCritic {
        fn with(scores: &[(&str, f64)]) -> Self {
            Self {
                scores: scores.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                ..Self::default()
            }
        }

        fn asked(&self) -> BTreeSet<String> {
            self.asked.lock().unwrap().iter().cloned().collect()
        }
    }

    #[async_trait]
    impl CriticBackend for PerCritic {
        async fn critique(&self, request: &CritiqueRequest) -> anyhow::Result<CritiqueResponse> {
            self.asked.lock().unwrap().push(request.critic_name.clone());
            match self.scores.get(&request.critic_name) {
                Some(&score) => Ok(uniform_critique(score)),
                None => bail!("{} is offline", request.critic_name),
            }
        }
    }

    fn panel_team() -> (Agent, Vec<Agent>) {
        let author = Agent::executor("builder", "developer", 0).with_priority(9);
        let agents = vec![
            author.clone(),
            Agent::executor("lead", "manager", 1).with_priority(8),
            Agent::executor("qa-1", "tester", 2).with_priority(3),
            Agent::requester("p", "builder", 3),
        ];
        (author, agents)
    }

    #[test]
    fn test_ten_point_scale_is_normalized() {
        let parsed = parse_response(uniform_critique(8.0)).unwrap();
        assert!(parsed
            .dimension_scores
            .iter()
            .all(|d| (d.score - 0.8).abs() < 1e-9));
    }

    #[test]
    fn test_unit_scale_is_kept() {
        let parsed = parse_response(uniform_critique(0.6)).unwrap();
        assert!((parsed.dimension_scores[0].score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_dimension_is_malformed() {
        let mut response = uniform_critique(7.0);
        response.dimension_scores.pop();
        let err = parse_response(response).unwrap_err();
        assert!(err.to_string().contains("missing dimension"));
    }

    #[test]
    fn test_out_of_range_score_is_malformed() {
        let mut response = uniform_critique(7.0);
        response.dimension_scores[0].score = 12.0;
        assert!(parse_response(response).is_err());
    }

    #[test]
    fn test_chinese_labels_are_accepted() {
        let labels = ["创新性", "逻辑性", "完整性", "可行性", "质量", "相关性"];
        let response = CritiqueResponse {
            dimension_scores: labels
                .iter()
                .map(|l| RawDimensionScore {
                    dimension: l.to_string(),
                    score: 9.0,
                    ..RawDimensionScore::default()
                })
                .collect(),
            ..CritiqueResponse::default()
        };
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.dimension_scores.len(), 6);
    }

    #[test]
    fn test_weighted_overall_respects_weights() {
        let mut config = SelfPlayConfig::default();
        let scores: Vec<DimensionScore> = CriticDimension::ALL
            .iter()
            .map(|&dimension| DimensionScore {
                dimension,
                score: if dimension == CriticDimension::Logic { 1.0 } else { 0.0 },
                reasoning: String::new(),
                suggestions: Vec::new(),
            })
            .collect();
        assert!((weighted_overall(&config, &scores) - 1.0 / 6.0).abs() < 1e-9);
        config.dimension_weights.insert(CriticDimension::Logic, 1.0);
        assert!((weighted_overall(&config, &scores) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_simulated_critique_is_reproducible() {
        let config = SelfPlayConfig::default();
        let mut a = Criticizer::new(None, CallPolicy::default(), config.clone(), 7);
        let mut b = Criticizer::new(None, CallPolicy::default(), config, 7);
        let ca = a.evaluate(1, "same content", "p", &critic()).await.unwrap();
        let cb = b.evaluate(1, "same content", "p", &critic()).await.unwrap();
        assert!(ca.simulated);
        assert_eq!(ca.overall_score, cb.overall_score);
        for d in &ca.dimension_scores {
            assert!((0.0..=1.0).contains(&d.score));
        }
    }

    #[tokio::test]
    async fn test_satisfaction_tracks_improvement() {
        let backend = Arc::new(Scripted::new(vec![
            selfgame_collab::fakes::ScriptStep::Respond(uniform_critique(5.0)),
            selfgame_collab::fakes::ScriptStep::Respond(uniform_critique(7.0)),
        ]));
        let mut criticizer =
            Criticizer::new(Some(backend.clone()), CallPolicy::default(), SelfPlayConfig::default(), 1);
        let first = criticizer.evaluate(1, "v1", "p", &critic()).await.unwrap();
        let second = criticizer.evaluate(2, "v2", "p", &critic()).await.unwrap();
        assert!((first.satisfaction_score - 0.7).abs() < 1e-9);
        assert!((second.satisfaction_score - 0.9).abs() < 1e-9);
        assert!(!second.satisfaction);

        let stats = criticizer.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.simulated, 0);
        assert!((stats.mean_overall - 0.6).abs() < 1e-9);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_panel_excludes_author_and_averages() {
        let backend = Arc::new(PerCritic::with(&[("builder", 2.0), ("lead", 6.0), ("qa-1", 8.0)]));
        let mut criticizer =
            Criticizer::new(Some(backend.clone()), CallPolicy::default(), SelfPlayConfig::default(), 1);
        let (author, agents) = panel_team();

        let critique = criticizer
            .evaluate_panel(1, "draft", "p", &agents, &author)
            .await
            .unwrap();

        let asked: Vec<String> = backend.asked().into_iter().collect();
        assert_eq!(asked, vec!["lead".to_string(), "qa-1".to_string()]);
        assert_eq!(critique.critic, "lead, qa-1");
        assert!(!critique.simulated);
        assert!((critique.overall_score - 0.7).abs() < 1e-9);
        assert!(critique
            .dimension_scores
            .iter()
            .all(|d| (d.score - 0.7).abs() < 1e-9));
        assert_eq!(criticizer.stats().total, 1);
    }

    #[tokio::test]
    async fn test_panel_drops_failed_critiques() {
        let backend = Arc::new(PerCritic::with(&[("lead", 6.0)]));
        let mut criticizer =
            Criticizer::new(Some(backend.clone()), CallPolicy::default(), SelfPlayConfig::default(), 1);
        let (author, agents) = panel_team();

        let critique = criticizer
            .evaluate_panel(1, "draft", "p", &agents, &author)
            .await
            .unwrap();

        assert!(backend.asked().contains("qa-1"));
        assert_eq!(critique.critic, "lead");
        assert!(!critique.simulated);
        assert!((critique.overall_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_panel_with_every_critique_failed_falls_back() {
        let (author, agents) = panel_team();
        let backend = Arc::new(PerCritic::default());
        let mut criticizer =
            Criticizer::new(Some(backend), CallPolicy::default(), SelfPlayConfig::default(), 1);
        let critique = criticizer
            .evaluate_panel(1, "draft", "p", &agents, &author)
            .await
            .unwrap();
        assert!(critique.simulated);
        assert_ne!(critique.critic, "builder");

        let strict = SelfPlayConfig {
            strict_stages: true,
            ..SelfPlayConfig::default()
        };
        let mut criticizer =
            Criticizer::new(Some(Arc::new(PerCritic::default())), CallPolicy::default(), strict, 1);
        let err = criticizer
            .evaluate_panel(1, "draft", "p", &agents, &author)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::MissingStage {
                stage: Stage::Critique,
                round: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_panel_of_one_is_a_single_critique() {
        let author = Agent::executor("builder", "developer", 0);
        let agents = vec![author.clone(), critic()];
        let backend = Arc::new(PerCritic::with(&[("reviewer", 9.0)]));
        let mut criticizer =
            Criticizer::new(Some(backend.clone()), CallPolicy::default(), SelfPlayConfig::default(), 1);
        let critique = criticizer
            .evaluate_panel(1, "draft", "p", &agents, &author)
            .await
            .unwrap();
        assert_eq!(critique.critic, "reviewer");
        assert!((critique.overall_score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_latest_critique_and_clear_history() {
        let backend = Arc::new(Scripted::new(vec![
            selfgame_collab::fakes::ScriptStep::Respond(uniform_critique(5.0)),
            selfgame_collab::fakes::ScriptStep::Respond(uniform_critique(7.0)),
        ]));
        let mut criticizer =
            Criticizer::new(Some(backend), CallPolicy::default(), SelfPlayConfig::default(), 1);
        assert!(criticizer.latest_critique().is_none());

        criticizer.evaluate(1, "v1", "p", &critic()).await.unwrap();
        criticizer.evaluate(2, "v2", "p", &critic()).await.unwrap();
        let latest = criticizer.latest_critique().unwrap();
        assert!((latest.overall_score - 0.7).abs() < 1e-9);

        criticizer.clear_history();
        assert!(criticizer.latest_critique().is_none());
        assert_eq!(criticizer.stats(), CritiqueStats::default());

        let fresh = criticizer.evaluate(3, "v3", "p", &critic()).await.unwrap();
        assert!((fresh.satisfaction_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_select_critic_prefers_reviewer_then_priority() {
        let actor = Agent::executor("builder", "developer", 0).with_priority(9);
        let lead = Agent::executor("lead", "manager", 1).with_priority(8);
        let qa = Agent::executor("qa-1", "tester", 2).with_priority(3);
        let agents = vec![actor.clone(), lead.clone(), qa.clone()];
        assert_eq!(select_critic(&agents, &actor, &KeywordPolicy::default()).name(), "qa-1");

        let agents = vec![actor.clone(), lead.clone()];
        assert_eq!(select_critic(&agents, &actor, &KeywordPolicy::default()).name(), "lead");

        let agents = vec![actor.clone()];
        assert_eq!(select_critic(&agents, &actor, &KeywordPolicy::default()).name(), "builder");
    }
}
