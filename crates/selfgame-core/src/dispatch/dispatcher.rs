//! The dynamic dispatcher: picks the next acting agent.
//!
//! One dispatcher per session. `select_next` takes `&mut self`, so calls
//! are serialized by the borrow checker and `iteration_count` /
//! `history` have a single writer.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use selfgame_collab::{
    call_with_retry, CallPolicy, CancelSignal, CollabResult, Collaborators, CompatibilityRequest,
    CompatibilityScorer, RequirementJudge, RequirementRequest, RequirementSignature,
};

use crate::config::{DispatchConfig, GameConfig, KeywordPolicy, ScorerMode};
use crate::dispatch::requirements::{self, ESCALATION};
use crate::dispatch::scoring::{self, CandidateScore};
use crate::domain::{Agent, GameError, Result};
use crate::obs;
use crate::routing::CommunicationMatrix;
use crate::text;

/// One dispatch decision. Failing calls are recorded with `to: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub iteration: u32,
    pub from: String,
    pub to: Option<String>,
    pub reason: String,
    pub score: Option<f64>,
    pub requirement: Option<RequirementSignature>,
    /// The judge or scorer fell back to the keyword heuristic.
    pub fallback_used: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-session dispatch state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchState {
    pub current_agent: Option<String>,
    pub history: Vec<DispatchRecord>,
    pub iteration_count: u32,
    pub max_iterations: u32,
}

impl DispatchState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            current_agent: None,
            history: Vec::new(),
            iteration_count: 0,
            max_iterations,
        }
    }
}

pub struct DynamicDispatcher {
    agents: Vec<Agent>,
    matrix: CommunicationMatrix,
    vocabulary: BTreeSet<String>,
    state: DispatchState,
    config: DispatchConfig,
    keywords: KeywordPolicy,
    calls: CallPolicy,
    judge: Option<Arc<dyn RequirementJudge>>,
    scorer: Option<Arc<dyn CompatibilityScorer>>,
    cancel: CancelSignal,
}

impl DynamicDispatcher {
    pub fn new(
        agents: Vec<Agent>,
        matrix: CommunicationMatrix,
        config: &GameConfig,
        collaborators: &Collaborators,
    ) -> Self {
        let vocabulary = agents
            .iter()
            .filter(|a| a.is_executor())
            .flat_map(Agent::capability_tokens)
            .collect();
        Self {
            agents,
            matrix,
            vocabulary,
            state: DispatchState::new(config.dispatch.max_iterations),
            config: config.dispatch.clone(),
            keywords: config.keywords.clone(),
            calls: config.calls,
            judge: collaborators.requirement_judge.clone(),
            scorer: collaborators.compatibility_scorer.clone(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn history(&self) -> &[DispatchRecord] {
        &self.state.history
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn matrix(&self) -> &CommunicationMatrix {
        &self.matrix
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// Pick the agent that acts after `current` produced `task_output`.
    ///
    /// Every call increments `iteration_count` and appends one history
    /// record. Once the count exceeds `max_iterations` the call fails with
    /// [`GameError::IterationLimitExceeded`] without consulting any
    /// collaborator.
    pub async fn select_next(&mut self, current: &str, task_output: &str) -> Result<Agent> {
        self.state.iteration_count += 1;
        let iteration = self.state.iteration_count;

        if iteration > self.state.max_iterations {
            self.record(current, None, "iteration limit exceeded".to_string(), None, None, false);
            return Err(GameError::IterationLimitExceeded {
                iteration_count: iteration,
                max_iterations: self.state.max_iterations,
            });
        }

        let Some(current_agent) = self.agent(current).cloned() else {
            self.record(current, None, format!("unknown agent {current}"), None, None, false);
            return Err(GameError::UnknownAgent(current.to_string()));
        };

        let (signature, judge_fallback) = match self.requirement(&current_agent, task_output).await {
            Ok(found) => found,
            Err(e) => {
                self.record(current, None, e.to_string(), None, None, false);
                return Err(e);
            }
        };

        let candidates: Vec<Agent> = self
            .matrix
            .neighbours(current)
            .into_iter()
            .filter_map(|name| self.agent(name))
            .filter(|a| a.is_executor())
            .cloned()
            .collect();
        if candidates.is_empty() {
            self.record(
                current,
                None,
                "no reachable candidates".to_string(),
                None,
                Some(signature),
                judge_fallback,
            );
            return Err(GameError::NoCandidates {
                from: current.to_string(),
            });
        }

        let mut scores = match self.score_candidates(&signature, &candidates).await {
            Ok(scores) => scores,
            Err(e) => {
                self.record(current, None, e.to_string(), None, Some(signature), judge_fallback);
                return Err(e);
            }
        };

        let escalation = signature.collaboration_type == ESCALATION
            || text::find_keyword(task_output, &self.keywords.escalation).is_some();
        let mut override_applied = false;
        if escalation {
            for (score, agent) in scores.iter_mut().zip(&candidates) {
                score.coordinator =
                    text::find_keyword(&agent.identity_text(), &self.keywords.coordinator).is_some();
            }
            override_applied = scores.iter().any(|s| s.coordinator);
        }

        let best = scores
            .iter()
            .zip(&candidates)
            .filter(|(s, _)| !override_applied || s.coordinator)
            .min_by(|a, b| scoring::rank((a.0, a.1), (b.0, b.1)))
            .map(|(s, a)| (s.clone(), a.clone()));
        let Some((chosen_score, chosen)) = best else {
            self.record(current, None, "no candidate selected".to_string(), None, Some(signature), judge_fallback);
            return Err(GameError::NoCandidates {
                from: current.to_string(),
            });
        };

        let reason = if override_applied {
            format!(
                "coordinator override ({}): {}",
                signature.collaboration_type,
                chosen.name()
            )
        } else {
            format!(
                "best score {:.3} of {} candidates for {} output",
                chosen_score.score,
                candidates.len(),
                signature.output_type
            )
        };
        let fallback_used = judge_fallback || scores.iter().any(|s| s.fallback_used);
        self.record(
            current,
            Some(chosen.name()),
            reason,
            Some(chosen_score.score),
            Some(signature),
            fallback_used,
        );
        self.state.current_agent = Some(chosen.name().to_string());
        Ok(chosen)
    }

    async fn requirement(
        &self,
        current: &Agent,
        task_output: &str,
    ) -> Result<(RequirementSignature, bool)> {
        let heuristic =
            || requirements::heuristic_signature(task_output, current, &self.vocabulary, &self.keywords);
        let Some(judge) = &self.judge else {
            return Ok((heuristic(), false));
        };
        match self.call_judge(judge.as_ref(), current, task_output).await {
            Ok(signature) => Ok((signature, false)),
            Err(e) if e.is_cancelled() => Err(GameError::Cancelled),
            Err(e) => {
                obs::emit_fallback_used(e.call(), &e.to_string());
                Ok((heuristic(), true))
            }
        }
    }

    async fn call_judge(
        &self,
        judge: &dyn RequirementJudge,
        current: &Agent,
        task_output: &str,
    ) -> CollabResult<RequirementSignature> {
        call_with_retry("requirement_judge", &self.calls, &self.cancel, |attempt| {
            let request = RequirementRequest {
                task_output: task_output.to_string(),
                agent_name: current.name().to_string(),
                role_type: current.role_type().to_string(),
                responsibilities: current.responsibilities().iter().cloned().collect(),
                skills: current.skills().iter().cloned().collect(),
                strict: attempt.strict,
            };
            async move { requirements::normalize_judged(judge.judge(&request).await?) }
        })
        .await
    }

    async fn score_candidates(
        &self,
        signature: &RequirementSignature,
        candidates: &[Agent],
    ) -> Result<Vec<CandidateScore>> {
        let scorer = match (self.config.compatibility_scorer, &self.scorer) {
            (ScorerMode::Pluggable, Some(scorer)) => Some(scorer.as_ref()),
            (ScorerMode::Pluggable, None) => {
                debug!("pluggable scorer selected but none configured; using skill overlap");
                None
            }
            (ScorerMode::Heuristic, _) => None,
        };

        let compat: Vec<(f64, bool)> = match scorer {
            None => candidates
                .iter()
                .map(|c| (scoring::skill_overlap(&signature.required_skills, c), false))
                .collect(),
            Some(scorer) => {
                let outcomes = join_all(
                    candidates
                        .iter()
                        .map(|c| self.call_scorer(scorer, signature, c)),
                )
                .await;
                let mut out = Vec::with_capacity(candidates.len());
                for (outcome, candidate) in outcomes.into_iter().zip(candidates) {
                    match outcome {
                        Ok(value) => out.push((value, false)),
                        Err(e) if e.is_cancelled() => return Err(GameError::Cancelled),
                        Err(e) => {
                            obs::emit_fallback_used(e.call(), &e.to_string());
                            out.push((
                                scoring::skill_overlap(&signature.required_skills, candidate),
                                true,
                            ));
                        }
                    }
                }
                out
            }
        };

        Ok(candidates
            .iter()
            .zip(compat)
            .map(|(candidate, (compatibility, fallback_used))| CandidateScore {
                name: candidate.name().to_string(),
                compatibility,
                fallback_used,
                score: scoring::combined_score(&self.config, compatibility, candidate.priority_level()),
                coordinator: false,
            })
            .collect())
    }

    async fn call_scorer(
        &self,
        scorer: &dyn CompatibilityScorer,
        signature: &RequirementSignature,
        candidate: &Agent,
    ) -> CollabResult<f64> {
        let request = CompatibilityRequest {
            required_skills: signature.required_skills.clone(),
            output_type: signature.output_type.clone(),
            candidate_name: candidate.name().to_string(),
            candidate_role_type: candidate.role_type().to_string(),
            candidate_skills: candidate.skills().iter().cloned().collect(),
            candidate_responsibilities: candidate.responsibilities().iter().cloned().collect(),
        };
        let request = &request;
        call_with_retry("compatibility_scorer", &self.calls, &self.cancel, |_| async move {
            let value = scorer.score(request).await?;
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("compatibility score {value} outside 0..=1");
            }
            Ok(value)
        })
        .await
    }

    fn record(
        &mut self,
        from: &str,
        to: Option<&str>,
        reason: String,
        score: Option<f64>,
        requirement: Option<RequirementSignature>,
        fallback_used: bool,
    ) {
        let iteration = self.state.iteration_count;
        obs::emit_dispatch(iteration, from, to, &reason);
        self.state.history.push(DispatchRecord {
            iteration,
            from: from.to_string(),
            to: to.map(str::to_string),
            reason,
            score,
            requirement,
            fallback_used,
            timestamp: Utc::now(),
        });
    }
}
