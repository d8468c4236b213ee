//! Candidate scoring for dispatch.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::DispatchConfig;
use crate::domain::agent::by_priority_then_order;
use crate::domain::Agent;
use crate::text;

/// Score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub name: String,
    /// Skill overlap, or the pluggable compatibility score.
    pub compatibility: f64,
    /// `compatibility` came from the heuristic after a scorer failure.
    pub fallback_used: bool,
    pub score: f64,
    pub coordinator: bool,
}

/// Jaccard overlap of required skills with the candidate's capabilities.
pub fn skill_overlap(required: &BTreeSet<String>, candidate: &Agent) -> f64 {
    text::jaccard(required, &candidate.capability_tokens())
}

/// `w_skill · compatibility + w_priority · priority/10`, normalized by the
/// weight sum so the result stays in 0..=1.
pub fn combined_score(config: &DispatchConfig, compatibility: f64, priority: u8) -> f64 {
    let total = config.skill_weight + config.priority_weight;
    if total <= 0.0 {
        return 0.0;
    }
    let priority = f64::from(priority) / 10.0;
    (config.skill_weight * compatibility + config.priority_weight * priority) / total
}

/// Ordering for selection: higher score first, then priority, then
/// creation order.
pub fn rank(a: (&CandidateScore, &Agent), b: (&CandidateScore, &Agent)) -> Ordering {
    b.0.score
        .total_cmp(&a.0.score)
        .then_with(|| by_priority_then_order(a.1, b.1))
}
