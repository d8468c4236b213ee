//! Bounded self-play loop.
//!
//! Rounds are strictly sequential. Within a round CRITIQUE and CHECK both
//! depend only on GENERATE and run concurrently. Every exit path returns a
//! well-formed [`GameResult`] holding the rounds completed so far.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use selfgame_collab::{CancelSignal, Collaborators};

use crate::config::{GameConfig, KeywordPolicy, SelfPlayConfig};
use crate::dispatch::DynamicDispatcher;
use crate::domain::{
    Agent, GameError, GameResult, SelfPlayRound, Stage, StageFailure, TerminationReason,
    REQUESTER_NAME,
};
use crate::obs;
use crate::self_play::{
    decide, select_critic, Actor, Checker, CritiqueStats, Criticizer, GenerationContext,
};
use crate::text;

/// Characters of the previous draft carried into the next round's context.
const CONTEXT_DRAFT_CHARS: usize = 2_000;

pub struct SelfPlayEngine {
    config: SelfPlayConfig,
    keywords: KeywordPolicy,
    actor: Actor,
    criticizer: Criticizer,
    checker: Checker,
    cancel: CancelSignal,
}

/// How a round ended when it did not produce a record.
enum Interrupt {
    Cancelled,
    Missing(StageFailure),
}

impl Interrupt {
    fn from_error(err: GameError, stage: Stage, round: u32) -> Self {
        match err {
            GameError::Cancelled => Interrupt::Cancelled,
            GameError::MissingStage {
                stage,
                round,
                detail,
            } => Interrupt::Missing(StageFailure {
                round,
                stage,
                detail,
            }),
            other => Interrupt::Missing(StageFailure {
                round,
                stage,
                detail: other.to_string(),
            }),
        }
    }
}

impl SelfPlayEngine {
    pub fn new(config: &GameConfig, collaborators: &Collaborators) -> Self {
        let sp = &config.self_play;
        Self {
            config: sp.clone(),
            keywords: config.keywords.clone(),
            actor: Actor::new(collaborators.generator.clone(), config.calls, sp.strict_stages),
            criticizer: Criticizer::new(
                collaborators.critic.clone(),
                config.calls,
                sp.clone(),
                config.simulation_seed,
            ),
            checker: Checker::new(
                collaborators.embedder.clone(),
                config.calls,
                sp.chunk_tokens,
                config.simulation_seed,
                sp.strict_stages,
            ),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.actor = self.actor.with_cancel(cancel.clone());
        self.criticizer = self.criticizer.with_cancel(cancel.clone());
        self.checker = self.checker.with_cancel(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn critique_stats(&self) -> CritiqueStats {
        self.criticizer.stats()
    }

    /// Play until a termination condition fires.
    ///
    /// The first actor is dispatched from the requester with the problem
    /// statement as task output; later actors are dispatched from the
    /// previous actor with its content.
    pub async fn run(
        &mut self,
        session_id: Uuid,
        problem_statement: &str,
        dispatcher: &mut DynamicDispatcher,
    ) -> GameResult {
        let mut rounds: Vec<SelfPlayRound> = Vec::new();

        let requester = dispatcher
            .agents()
            .iter()
            .find(|a| a.is_requester())
            .map(|a| a.name().to_string())
            .unwrap_or_else(|| REQUESTER_NAME.to_string());
        let mut actor = match self.dispatch(dispatcher, &requester, problem_statement, 1).await {
            Ok(agent) => agent,
            Err(reason) => return finish(session_id, rounds, reason),
        };

        let mut round_number = 1;
        loop {
            if self.cancel.is_cancelled() {
                return finish(session_id, rounds, Interrupt::Cancelled.into());
            }

            let round = match self
                .play_round(round_number, problem_statement, &actor, &rounds, dispatcher.agents())
                .await
            {
                Ok(round) => round,
                Err(interrupt) => return finish(session_id, rounds, interrupt.into()),
            };
            obs::emit_round_finished(&round);
            let content = round.actor_output.content.clone();
            rounds.push(round);

            if let Some(reason) = decide(&self.config, &rounds) {
                return finish(session_id, rounds, Ending::Reason(reason));
            }

            actor = match self
                .dispatch(dispatcher, actor.name(), &content, round_number + 1)
                .await
            {
                Ok(agent) => agent,
                Err(ending) => return finish(session_id, rounds, ending),
            };
            round_number += 1;
        }
    }

    async fn dispatch(
        &self,
        dispatcher: &mut DynamicDispatcher,
        from: &str,
        task_output: &str,
        next_round: u32,
    ) -> std::result::Result<Agent, Ending> {
        match dispatcher.select_next(from, task_output).await {
            Ok(agent) => {
                debug!(round = next_round, agent = %agent.name(), "next actor dispatched");
                Ok(agent)
            }
            Err(GameError::IterationLimitExceeded { .. }) => {
                Err(Ending::Reason(TerminationReason::IterationLimitExceeded))
            }
            Err(err) => Err(Interrupt::from_error(err, Stage::Dispatch, next_round).into()),
        }
    }

    async fn play_round(
        &mut self,
        round_number: u32,
        problem_statement: &str,
        actor: &Agent,
        rounds: &[SelfPlayRound],
        agents: &[Agent],
    ) -> std::result::Result<SelfPlayRound, Interrupt> {
        let started = Instant::now();
        let ctx = GenerationContext {
            round: round_number,
            agent: actor,
            problem_statement,
            context: round_context(problem_statement, rounds),
            history_summary: history_summary(rounds, self.config.history_summary_chars),
        };

        let actor_output = self
            .actor
            .generate(&ctx)
            .await
            .map_err(|e| Interrupt::from_error(e, Stage::Generate, round_number))?;

        let content = actor_output.content.as_str();
        let criticizer = &mut self.criticizer;
        let keywords = &self.keywords;
        let multi_critic = self.config.multi_critic;
        let critique = async move {
            if multi_critic {
                criticizer
                    .evaluate_panel(round_number, content, problem_statement, agents, actor)
                    .await
            } else {
                let critic = select_critic(agents, actor, keywords);
                criticizer
                    .evaluate(round_number, content, problem_statement, critic)
                    .await
            }
        };
        let (critique, novelty) =
            tokio::join!(critique, self.checker.check(round_number, content));

        let (critique, novelty) = match (critique, novelty) {
            (Ok(c), Ok(n)) => (c, n),
            (Err(GameError::Cancelled), _) | (_, Err(GameError::Cancelled)) => {
                return Err(Interrupt::Cancelled)
            }
            (Err(e), _) => return Err(Interrupt::from_error(e, Stage::Critique, round_number)),
            (_, Err(e)) => return Err(Interrupt::from_error(e, Stage::Check, round_number)),
        };

        let convergence_delta = rounds
            .last()
            .map(|prev| (critique.overall_score - prev.overall_score()).abs())
            .unwrap_or(0.0);

        Ok(SelfPlayRound {
            round_number,
            actor_output,
            critique,
            novelty,
            convergence_delta,
            duration: started.elapsed(),
            completed_at: Utc::now(),
        })
    }
}

/// Final outcome of a run.
enum Ending {
    Reason(TerminationReason),
    Missing(StageFailure),
}

impl From<Interrupt> for Ending {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Ending::Reason(TerminationReason::Cancelled),
            Interrupt::Missing(failure) => Ending::Missing(failure),
        }
    }
}

fn finish(session_id: Uuid, rounds: Vec<SelfPlayRound>, ending: Ending) -> GameResult {
    let (reason, failure) = match ending {
        Ending::Reason(reason) => (reason, None),
        Ending::Missing(failure) => {
            warn!(
                round = failure.round,
                stage = %failure.stage,
                detail = %failure.detail,
                "stage missing; ending game"
            );
            (TerminationReason::MissingStage, Some(failure))
        }
    };
    obs::emit_game_finished(&session_id.to_string(), reason, rounds.len());
    GameResult::new(session_id, rounds, reason, failure)
}

/// The previous draft and its critique, or the request on round 1.
fn round_context(problem_statement: &str, rounds: &[SelfPlayRound]) -> String {
    let Some(prev) = rounds.last() else {
        return format!("Initial request:\n{problem_statement}");
    };
    let mut out = format!(
        "Previous draft (round {} by {}):\n{}\n\nCritique ({:.2}): {}\n",
        prev.round_number,
        prev.actor_output.agent,
        text::truncate_chars(&prev.actor_output.content, CONTEXT_DRAFT_CHARS),
        prev.overall_score(),
        prev.critique.summary,
    );
    for suggestion in &prev.critique.suggestions {
        out.push_str("- ");
        out.push_str(suggestion);
        out.push('\n');
    }
    out
}

/// One line per round, most recent last, capped at `max_chars`.
fn history_summary(rounds: &[SelfPlayRound], max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut used = 0;
    for round in rounds.iter().rev() {
        let line = format!(
            "round {} by {}: overall {:.2}, novelty {:.2}",
            round.round_number,
            round.actor_output.agent,
            round.overall_score(),
            round.novelty_score()
        );
        let len = line.chars().count() + 1;
        if used + len > max_chars {
            break;
        }
        used += len;
        lines.push(line);
    }
    lines.reverse();
    lines.join("\n")
}
