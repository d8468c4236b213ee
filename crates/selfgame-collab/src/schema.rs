//! Request / response schema exchanged with pluggable collaborators.
//!
//! Every type here is plain serde data so a backend can forward it to a
//! structured-output model call verbatim. Response types are permissive on
//! the wire (`#[serde(default)]`); callers validate them before use.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Domain information supplied alongside the problem statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Free-form domain label, e.g. `"logistics"`.
    pub domain: String,
    /// Requested executor count; the builder's configured default applies when absent.
    pub desired_agent_count: Option<usize>,
    pub requirements: Vec<String>,
    pub constraints: Vec<String>,
}

impl DomainConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }
}

/// A draft role record as proposed by a [`crate::RoleProposer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDraft {
    pub name: String,
    pub role_type: String,
    pub responsibilities: Vec<String>,
    pub skills: Vec<String>,
    pub output_requirements: String,
    /// Expected in 1..=10. Missing values are estimated by the builder.
    pub priority_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProposalRequest {
    pub problem_statement: String,
    pub domain: DomainConfig,
    pub desired_count: usize,
    /// Set on retries after malformed output.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionProposalRequest {
    pub problem_statement: String,
    pub roles: Vec<RoleDraft>,
    pub strict: bool,
}

/// Role name → names it may send to.
pub type PermissionMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub problem_statement: String,
    pub role: RoleDraft,
    /// Names this role may reach.
    pub reachable: Vec<String>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRequest {
    pub problem_statement: String,
    pub role: RoleDraft,
}

/// A directed edge by agent name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    pub from: String,
    pub to: String,
}

impl EdgeRef {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenEdgeRequest {
    pub roles: Vec<RoleDraft>,
    pub allowed: Vec<EdgeRef>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRequest {
    pub task_output: String,
    pub agent_name: String,
    pub role_type: String,
    pub responsibilities: Vec<String>,
    pub skills: Vec<String>,
    pub strict: bool,
}

/// What the next step needs from whoever acts next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementSignature {
    pub required_skills: BTreeSet<String>,
    pub output_type: String,
    pub collaboration_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityRequest {
    pub required_skills: BTreeSet<String>,
    pub output_type: String,
    pub candidate_name: String,
    pub candidate_role_type: String,
    pub candidate_skills: Vec<String>,
    pub candidate_responsibilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub round: u32,
    pub agent_name: String,
    pub role_type: String,
    pub system_prompt: String,
    pub problem_statement: String,
    pub context: String,
    pub history_summary: String,
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationResponse {
    pub content: String,
}

/// Condensed view of an earlier critique, given to the critic for continuity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousCritique {
    pub round: u32,
    pub overall_score: f64,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueRequest {
    pub round: u32,
    pub content: String,
    pub problem_statement: String,
    pub critic_name: String,
    pub critic_role_type: String,
    pub critic_prompt: String,
    /// Canonical dimension keys the response must cover.
    pub dimensions: Vec<String>,
    pub previous: Vec<PreviousCritique>,
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDimensionScore {
    /// Dimension key or label (`"logic"`, `"逻辑性"`, ...).
    pub dimension: String,
    /// Either 0..=1 or 0..=10; normalized by the criticizer.
    pub score: f64,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CritiqueResponse {
    pub dimension_scores: Vec<RawDimensionScore>,
    pub overall_score: Option<f64>,
    pub summary_critique: String,
    pub improvement_suggestions: Vec<String>,
}

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex is valid")
    })
}

impl CritiqueResponse {
    /// Parse a free-text model reply.
    ///
    /// Looks for a fenced ```json block first, then falls back to the span
    /// between the first `{` and the last `}`.
    pub fn from_llm_text(text: &str) -> anyhow::Result<Self> {
        let body = extract_json_object(text)
            .ok_or_else(|| anyhow::anyhow!("no JSON object found in critique reply"))?;
        Ok(serde_json::from_str(body)?)
    }
}

/// Locate the JSON object inside a model reply.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(caps) = fenced_json().captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_fenced_block() {
        let text = "preamble {\"x\":1}\n```json\n{\"summary_critique\": \"ok\"}\n```";
        assert_eq!(extract_json_object(text), Some("{\"summary_critique\": \"ok\"}"));
    }

    #[test]
    fn test_from_llm_text_parses_bare_object() {
        let text = r#"Here you go: {"dimension_scores": [{"dimension": "逻辑性", "score": 8.0}], "overall_score": 7.5} thanks"#;
        let parsed = CritiqueResponse::from_llm_text(text).unwrap();
        assert_eq!(parsed.dimension_scores.len(), 1);
        assert_eq!(parsed.dimension_scores[0].dimension, "逻辑性");
        assert_eq!(parsed.overall_score, Some(7.5));
        assert!(parsed.improvement_suggestions.is_empty());
    }

    #[test]
    fn test_from_llm_text_rejects_prose() {
        assert!(CritiqueResponse::from_llm_text("no structure here").is_err());
    }

    #[test]
    fn test_role_draft_tolerates_missing_fields() {
        let draft: RoleDraft = serde_json::from_str(r#"{"name": "analyst"}"#).unwrap();
        assert_eq!(draft.name, "analyst");
        assert!(draft.priority_level.is_none());
        assert!(draft.responsibilities.is_empty());
    }
}
