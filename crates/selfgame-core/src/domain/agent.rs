//! Agent records: the nodes of the interaction graph.
//!
//! Roles are open data. Nothing in the crate switches on a role name or
//! role type; behaviour that depends on "what kind of agent" this is goes
//! through keyword tables in [`crate::config::KeywordPolicy`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use selfgame_collab::RoleDraft;

use crate::text;

/// Name of the synthetic requester node.
pub const REQUESTER_NAME: &str = "requester";

/// Valid priority levels.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Priority used when neither the proposer nor the estimator supplies one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Role-graph stage whose deterministic fallback supplied part of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    Roles,
    Priority,
    Permissions,
    Prompt,
}

/// A participant in the interaction graph: the requester or an executor.
///
/// Identity fields are fixed at construction. `connection_permissions` is
/// only rewritten by the signal router when the forbidden-path policy
/// removes an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    role_type: String,
    responsibilities: BTreeSet<String>,
    skills: BTreeSet<String>,
    output_requirements: String,
    priority_level: u8,
    connection_permissions: BTreeSet<String>,
    system_prompt: String,
    is_requester: bool,
    creation_order: usize,
    fallback_sources: BTreeSet<FallbackSource>,
}

impl Agent {
    /// Start an executor record. Priority defaults to [`DEFAULT_PRIORITY`].
    pub fn executor(name: impl Into<String>, role_type: impl Into<String>, order: usize) -> Self {
        Self {
            name: name.into(),
            role_type: role_type.into(),
            responsibilities: BTreeSet::new(),
            skills: BTreeSet::new(),
            output_requirements: String::new(),
            priority_level: DEFAULT_PRIORITY,
            connection_permissions: BTreeSet::new(),
            system_prompt: String::new(),
            is_requester: false,
            creation_order: order,
            fallback_sources: BTreeSet::new(),
        }
    }

    /// The synthetic requester: states the problem, sends to exactly one executor.
    pub fn requester(problem_statement: &str, target: &str, order: usize) -> Self {
        Self {
            name: REQUESTER_NAME.to_string(),
            role_type: REQUESTER_NAME.to_string(),
            responsibilities: BTreeSet::from([
                "state the problem".to_string(),
                "accept the final answer".to_string(),
            ]),
            skills: BTreeSet::new(),
            output_requirements: "problem statement".to_string(),
            priority_level: *PRIORITY_RANGE.end(),
            connection_permissions: BTreeSet::from([target.to_string()]),
            system_prompt: problem_statement.to_string(),
            is_requester: true,
            creation_order: order,
            fallback_sources: BTreeSet::new(),
        }
    }

    pub fn with_responsibilities<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skills<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_requirements(mut self, output: impl Into<String>) -> Self {
        self.output_requirements = output.into();
        self
    }

    pub fn with_priority(mut self, level: u8) -> Self {
        self.priority_level = level;
        self
    }

    pub fn with_permissions<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connection_permissions = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Mark that `source` fell back when `used`. Marks are never cleared.
    pub fn with_fallback(mut self, source: FallbackSource, used: bool) -> Self {
        if used {
            self.fallback_sources.insert(source);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role_type(&self) -> &str {
        &self.role_type
    }

    pub fn responsibilities(&self) -> &BTreeSet<String> {
        &self.responsibilities
    }

    pub fn skills(&self) -> &BTreeSet<String> {
        &self.skills
    }

    pub fn output_requirements(&self) -> &str {
        &self.output_requirements
    }

    pub fn priority_level(&self) -> u8 {
        self.priority_level
    }

    pub fn connection_permissions(&self) -> &BTreeSet<String> {
        &self.connection_permissions
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn is_requester(&self) -> bool {
        self.is_requester
    }

    pub fn is_executor(&self) -> bool {
        !self.is_requester
    }

    pub fn creation_order(&self) -> usize {
        self.creation_order
    }

    /// Any stage fell back, including a collaborator that was not configured.
    pub fn fallback_used(&self) -> bool {
        !self.fallback_sources.is_empty()
    }

    pub fn fell_back_on(&self, source: FallbackSource) -> bool {
        self.fallback_sources.contains(&source)
    }

    pub fn fallback_sources(&self) -> &BTreeSet<FallbackSource> {
        &self.fallback_sources
    }

    /// Normalized tokens of skills ∪ responsibilities.
    pub fn capability_tokens(&self) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        for item in self.skills.iter().chain(self.responsibilities.iter()) {
            tokens.extend(text::tokenize(item));
        }
        tokens
    }

    /// Lowercased `name role_type`, used for keyword matching.
    pub fn identity_text(&self) -> String {
        format!("{} {}", self.name, self.role_type).to_lowercase()
    }

    /// The collaborator-facing view of this agent.
    pub fn to_draft(&self) -> RoleDraft {
        RoleDraft {
            name: self.name.clone(),
            role_type: self.role_type.clone(),
            responsibilities: self.responsibilities.iter().cloned().collect(),
            skills: self.skills.iter().cloned().collect(),
            output_requirements: self.output_requirements.clone(),
            priority_level: Some(i64::from(self.priority_level)),
        }
    }

    pub(crate) fn set_connection_permissions(&mut self, targets: BTreeSet<String>) {
        self.connection_permissions = targets;
    }
}

/// Executors ordered by descending priority, ties by creation order.
pub fn by_priority_then_order(a: &Agent, b: &Agent) -> std::cmp::Ordering {
    b.priority_level
        .cmp(&a.priority_level)
        .then(a.creation_order.cmp(&b.creation_order))
}
