//! GENERATE stage.

use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use selfgame_collab::{call_with_retry, CallPolicy, CancelSignal, GenerationRequest, Generator};

use crate::domain::{ActorOutput, Agent, Result, Stage};
use crate::self_play::{absorb_failure, missing_collaborator};

/// Everything the acting agent sees for one round.
#[derive(Debug, Clone)]
pub struct GenerationContext<'a> {
    pub round: u32,
    pub agent: &'a Agent,
    pub problem_statement: &'a str,
    /// Previous draft plus the critique it received; the request on round 1.
    pub context: String,
    pub history_summary: String,
}

/// Produces round content through the generator, or a template.
pub struct Actor {
    generator: Option<Arc<dyn Generator>>,
    calls: CallPolicy,
    cancel: CancelSignal,
    strict: bool,
}

impl Actor {
    pub fn new(generator: Option<Arc<dyn Generator>>, calls: CallPolicy, strict: bool) -> Self {
        Self {
            generator,
            calls,
            cancel: CancelSignal::never(),
            strict,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<ActorOutput> {
        let started = Instant::now();
        let generated = match &self.generator {
            Some(generator) => {
                let request = GenerationRequest {
                    round: ctx.round,
                    agent_name: ctx.agent.name().to_string(),
                    role_type: ctx.agent.role_type().to_string(),
                    system_prompt: ctx.agent.system_prompt().to_string(),
                    problem_statement: ctx.problem_statement.to_string(),
                    context: ctx.context.clone(),
                    history_summary: ctx.history_summary.clone(),
                    strict: false,
                };
                let generator = generator.as_ref();
                let request = &request;
                let outcome = call_with_retry("generator", &self.calls, &self.cancel, |attempt| {
                    let request = GenerationRequest {
                        strict: attempt.strict,
                        ..request.clone()
                    };
                    async move {
                        let response = generator.generate(&request).await?;
                        let content = response.content.trim();
                        if content.is_empty() {
                            bail!("generator returned empty content");
                        }
                        Ok(content.to_string())
                    }
                })
                .await;
                match outcome {
                    Ok(content) => Some(content),
                    Err(e) => {
                        absorb_failure(e, Stage::Generate, ctx.round, self.strict)?;
                        None
                    }
                }
            }
            None => {
                missing_collaborator("generator", Stage::Generate, ctx.round, self.strict)?;
                None
            }
        };

        let fallback_used = generated.is_none();
        let content = generated.unwrap_or_else(|| fallback_content(ctx));
        Ok(ActorOutput {
            agent: ctx.agent.name().to_string(),
            content,
            fallback_used,
            duration: started.elapsed(),
        })
    }
}

/// Deterministic content built from the agent's fields and the context.
pub fn fallback_content(ctx: &GenerationContext<'_>) -> String {
    let agent = ctx.agent;
    let duties = if agent.responsibilities().is_empty() {
        "contribute to the shared answer".to_string()
    } else {
        agent
            .responsibilities()
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    };
    let mut out = format!(
        "Round {round} contribution from {name} ({role}).\n\
         Problem: {problem}\n\
         Focus: {duties}\n\
         Deliverable: {output}\n",
        round = ctx.round,
        name = agent.name(),
        role = agent.role_type(),
        problem = ctx.problem_statement,
        output = if agent.output_requirements().is_empty() {
            "written answer"
        } else {
            agent.output_requirements()
        },
    );
    if ctx.round > 1 && !ctx.context.is_empty() {
        out.push_str("Building on the previous round:\n");
        out.push_str(&ctx.context);
        out.push('\n');
    }
    out
}
