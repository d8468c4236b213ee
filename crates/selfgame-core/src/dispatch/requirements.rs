//! Requirement signatures: what the next step needs.

use std::collections::BTreeSet;

use selfgame_collab::RequirementSignature;

use crate::config::KeywordPolicy;
use crate::domain::Agent;
use crate::text;

pub const DEFAULT_OUTPUT_TYPE: &str = "text";
pub const DEFAULT_COLLABORATION_TYPE: &str = "sequential";
pub const ESCALATION: &str = "escalation";

/// Keyword extraction over `task_output` and the current agent.
///
/// Required skills are the task-output tokens found in `vocabulary` (the
/// capability tokens of the whole graph). When the output names none of
/// them, the current agent's own capabilities stand in, so work continues
/// along its specialty.
pub fn heuristic_signature(
    task_output: &str,
    current: &Agent,
    vocabulary: &BTreeSet<String>,
    keywords: &KeywordPolicy,
) -> RequirementSignature {
    let task_tokens = text::tokenize(task_output);
    let mut required_skills: BTreeSet<String> =
        task_tokens.intersection(vocabulary).cloned().collect();
    if required_skills.is_empty() {
        required_skills = current.capability_tokens();
    }

    let output_type = KeywordPolicy::classify(&keywords.output_types, task_output)
        .or_else(|| KeywordPolicy::classify(&keywords.output_types, current.output_requirements()))
        .unwrap_or(DEFAULT_OUTPUT_TYPE)
        .to_string();

    let collaboration_type = if text::find_keyword(task_output, &keywords.escalation).is_some() {
        ESCALATION
    } else {
        KeywordPolicy::classify(&keywords.collaboration_types, task_output)
            .unwrap_or(DEFAULT_COLLABORATION_TYPE)
    }
    .to_string();

    RequirementSignature {
        required_skills,
        output_type,
        collaboration_type,
    }
}

/// Normalize a judged signature: skill phrases become tokens, blank tags
/// get defaults. An empty skill set is malformed.
pub fn normalize_judged(signature: RequirementSignature) -> anyhow::Result<RequirementSignature> {
    let required_skills: BTreeSet<String> = signature
        .required_skills
        .iter()
        .flat_map(|skill| text::tokenize(skill))
        .collect();
    if required_skills.is_empty() {
        anyhow::bail!("requirement judge returned no skills");
    }
    let or_default = |value: String, default: &str| {
        let value = value.trim().to_lowercase();
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };
    Ok(RequirementSignature {
        required_skills,
        output_type: or_default(signature.output_type, DEFAULT_OUTPUT_TYPE),
        collaboration_type: or_default(signature.collaboration_type, DEFAULT_COLLABORATION_TYPE),
    })
}
