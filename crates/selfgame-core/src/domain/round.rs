//! Self-play round records and the final game result.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stages of one self-play round. `Dispatch` covers picking the next actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generate,
    Critique,
    Check,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Generate => "generate",
            Stage::Critique => "critique",
            Stage::Check => "check",
            Stage::Dispatch => "dispatch",
        };
        write!(f, "{s}")
    }
}

/// The fixed critique dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticDimension {
    Innovation,
    Logic,
    Completeness,
    Feasibility,
    Quality,
    Relevance,
}

impl CriticDimension {
    pub const ALL: [CriticDimension; 6] = [
        CriticDimension::Innovation,
        CriticDimension::Logic,
        CriticDimension::Completeness,
        CriticDimension::Feasibility,
        CriticDimension::Quality,
        CriticDimension::Relevance,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CriticDimension::Innovation => "innovation",
            CriticDimension::Logic => "logic",
            CriticDimension::Completeness => "completeness",
            CriticDimension::Feasibility => "feasibility",
            CriticDimension::Quality => "quality",
            CriticDimension::Relevance => "relevance",
        }
    }

    /// Accepts the canonical key or the Chinese label models often return.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let dim = match label.as_str() {
            "innovation" | "创新性" => CriticDimension::Innovation,
            "logic" | "逻辑性" => CriticDimension::Logic,
            "completeness" | "完整性" => CriticDimension::Completeness,
            "feasibility" | "可行性" => CriticDimension::Feasibility,
            "quality" | "质量" => CriticDimension::Quality,
            "relevance" | "相关性" => CriticDimension::Relevance,
            _ => return None,
        };
        Some(dim)
    }
}

impl fmt::Display for CriticDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One dimension of a critique, normalized to 0.0..=1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: CriticDimension,
    pub score: f64,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

/// Criticizer output for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub critic: String,
    pub dimension_scores: Vec<DimensionScore>,
    /// Weighted mean of `dimension_scores`.
    pub overall_score: f64,
    /// `overall_score >= quality_threshold`.
    pub satisfaction: bool,
    /// Improvement relative to the previous critique, 0.0..=1.0.
    pub satisfaction_score: f64,
    pub summary: String,
    pub suggestions: Vec<String>,
    /// `true` when the deterministic fallback produced these scores.
    pub simulated: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl Critique {
    pub fn score_for(&self, dimension: CriticDimension) -> Option<f64> {
        self.dimension_scores
            .iter()
            .find(|d| d.dimension == dimension)
            .map(|d| d.score)
    }
}

/// Per-chunk statistics from the novelty check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStat {
    pub index: usize,
    pub token_count: usize,
    /// Prediction error in 0.0..=1.0; `None` when no prediction existed.
    pub prediction_error: Option<f64>,
}

/// Checker output for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyReport {
    /// Always within 0.0..=1.0.
    pub novelty_score: f64,
    pub simulated: bool,
    pub chunks: Vec<ChunkStat>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Actor output for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorOutput {
    pub agent: String,
    pub content: String,
    pub fallback_used: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// One completed round. Never mutated after it is appended to the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfPlayRound {
    pub round_number: u32,
    pub actor_output: ActorOutput,
    pub critique: Critique,
    pub novelty: NoveltyReport,
    /// |overall(round) − overall(round − 1)|, 0.0 for round 1.
    pub convergence_delta: f64,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

impl SelfPlayRound {
    pub fn overall_score(&self) -> f64 {
        self.critique.overall_score
    }

    pub fn novelty_score(&self) -> f64 {
        self.novelty.novelty_score
    }

    /// Whether any stage of this round ran on a fallback.
    pub fn simulated(&self) -> bool {
        self.actor_output.fallback_used || self.critique.simulated || self.novelty.simulated
    }
}

/// Why the game stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxRoundsReached,
    QualityThresholdMet,
    Converged,
    NoveltyThresholdMet,
    MissingStage,
    IterationLimitExceeded,
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::MaxRoundsReached => "max_rounds_reached",
            TerminationReason::QualityThresholdMet => "quality_threshold_met",
            TerminationReason::Converged => "converged",
            TerminationReason::NoveltyThresholdMet => "novelty_threshold_met",
            TerminationReason::MissingStage => "missing_stage",
            TerminationReason::IterationLimitExceeded => "iteration_limit_exceeded",
            TerminationReason::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Detail for a `missing_stage` termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub round: u32,
    pub stage: Stage,
    pub detail: String,
}

/// Score and novelty trends across the rounds of a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuality {
    pub rounds: usize,
    pub mean_overall: f64,
    pub best_overall: f64,
    pub best_round: Option<u32>,
    pub final_overall: f64,
    /// final − first overall score.
    pub overall_trend: f64,
    pub mean_novelty: f64,
    pub final_novelty: f64,
    /// final − first novelty score.
    pub novelty_trend: f64,
    pub simulated_rounds: usize,
}

impl AggregateQuality {
    pub fn from_rounds(rounds: &[SelfPlayRound]) -> Self {
        let (Some(first), Some(last)) = (rounds.first(), rounds.last()) else {
            return Self::default();
        };
        let n = rounds.len() as f64;
        let best = rounds
            .iter()
            .max_by(|a, b| a.overall_score().total_cmp(&b.overall_score()));

        Self {
            rounds: rounds.len(),
            mean_overall: rounds.iter().map(|r| r.overall_score()).sum::<f64>() / n,
            best_overall: best.map(|r| r.overall_score()).unwrap_or_default(),
            best_round: best.map(|r| r.round_number),
            final_overall: last.overall_score(),
            overall_trend: last.overall_score() - first.overall_score(),
            mean_novelty: rounds.iter().map(|r| r.novelty_score()).sum::<f64>() / n,
            final_novelty: last.novelty_score(),
            novelty_trend: last.novelty_score() - first.novelty_score(),
            simulated_rounds: rounds.iter().filter(|r| r.simulated()).count(),
        }
    }
}

/// Outcome of a self-play game, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub session_id: Uuid,
    pub rounds: Vec<SelfPlayRound>,
    pub termination_reason: TerminationReason,
    pub aggregate_quality: AggregateQuality,
    pub stage_failure: Option<StageFailure>,
}

impl GameResult {
    pub fn new(
        session_id: Uuid,
        rounds: Vec<SelfPlayRound>,
        termination_reason: TerminationReason,
        stage_failure: Option<StageFailure>,
    ) -> Self {
        let aggregate_quality = AggregateQuality::from_rounds(&rounds);
        Self {
            session_id,
            rounds,
            termination_reason,
            aggregate_quality,
            stage_failure,
        }
    }

    /// Content of the last completed round, if any.
    pub fn final_content(&self) -> Option<&str> {
        self.rounds.last().map(|r| r.actor_output.content.as_str())
    }
}

/// Serialize `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
