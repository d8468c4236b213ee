//! DECIDE stage: pure termination check over the rounds so far.

use crate::config::SelfPlayConfig;
use crate::domain::{SelfPlayRound, TerminationReason};

/// The termination reason after the last round, if any.
///
/// Conditions are checked in priority order: round limit, quality,
/// convergence, novelty. Round 1 never counts toward the convergence
/// streak since it has no predecessor.
pub fn decide(config: &SelfPlayConfig, rounds: &[SelfPlayRound]) -> Option<TerminationReason> {
    let last = rounds.last()?;

    if last.round_number >= config.max_rounds {
        return Some(TerminationReason::MaxRoundsReached);
    }
    if last.overall_score() >= config.quality_threshold && last.critique.satisfaction {
        return Some(TerminationReason::QualityThresholdMet);
    }
    if convergence_streak(config, rounds) >= config.convergence_rounds {
        return Some(TerminationReason::Converged);
    }
    if last.novelty_score() >= config.novelty_threshold {
        return Some(TerminationReason::NoveltyThresholdMet);
    }
    None
}

/// Trailing rounds (after round 1) whose delta is within the threshold.
pub fn convergence_streak(config: &SelfPlayConfig, rounds: &[SelfPlayRound]) -> u32 {
    rounds
        .iter()
        .rev()
        .take_while(|r| r.round_number > 1 && r.convergence_delta <= config.convergence_threshold)
        .count() as u32
}
