//! Role graph construction.
//!
//! Four collaborator stages, each with retry and a deterministic fallback:
//! role proposal, priority estimation, permission proposal and prompt
//! composition. The requester is synthesized here, never proposed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::bail;
use futures::future::join_all;
use tracing::{debug, info, warn};

use selfgame_collab::{
    call_with_retry, CallPolicy, CancelSignal, CollabResult, Collaborators,
    DomainConfig, PermissionMap, PermissionProposalRequest, PermissionProposer, PriorityEstimator,
    PriorityRequest, PromptComposer, PromptRequest, RoleDraft, RoleProposalRequest, RoleProposer,
};

use crate::config::{GameConfig, KeywordPolicy, RoleGraphConfig};
use crate::domain::agent::by_priority_then_order;
use crate::domain::{
    Agent, FallbackSource, GameError, Result, DEFAULT_PRIORITY, PRIORITY_RANGE, REQUESTER_NAME,
};
use crate::obs;
use crate::role_graph::fallback;

/// Turns a problem statement into validated agents, requester included.
pub struct RoleGraphBuilder {
    config: RoleGraphConfig,
    keywords: KeywordPolicy,
    calls: CallPolicy,
    collaborators: Collaborators,
    cancel: CancelSignal,
}

/// Map a collaborator error to either cancellation or "use the fallback".
fn absorb<T>(outcome: CollabResult<T>) -> Result<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_cancelled() => Err(GameError::Cancelled),
        Err(e) => {
            obs::emit_fallback_used(e.call(), &e.to_string());
            Ok(None)
        }
    }
}

fn non_empty(items: &[String]) -> impl Iterator<Item = &str> {
    items.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn in_priority_range(value: i64) -> Option<u8> {
    u8::try_from(value)
        .ok()
        .filter(|p| PRIORITY_RANGE.contains(p))
}

impl RoleGraphBuilder {
    pub fn new(config: &GameConfig, collaborators: &Collaborators) -> Self {
        Self {
            config: config.role_graph.clone(),
            keywords: config.keywords.clone(),
            calls: config.calls,
            collaborators: collaborators.clone(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build executors plus the requester.
    ///
    /// Collaborator failures, and collaborators that are not configured,
    /// fall back silently apart from the per-stage fallback marks on the
    /// affected agents. A graph that still
    /// violates its structural invariants is a [`GameError::Schema`].
    pub async fn build(
        &self,
        problem_statement: &str,
        domain: &DomainConfig,
    ) -> Result<Vec<Agent>> {
        let desired = domain
            .desired_agent_count
            .unwrap_or(self.config.default_agent_count)
            .clamp(1, self.config.max_agent_count.max(1));

        let (drafts, roles_fallback) = self.propose_roles(problem_statement, domain, desired).await?;

        let mut priorities = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            priorities.push(self.resolve_priority(problem_statement, draft).await?);
        }

        let names: Vec<String> = drafts.iter().map(|d| d.name.clone()).collect();
        let (permissions, permissions_fallback) =
            self.propose_permissions(problem_statement, &drafts, &names).await?;

        let prompts = join_all(drafts.iter().zip(&priorities).map(|(draft, (priority, _))| {
            let reachable: Vec<String> = permissions
                .get(&draft.name)
                .map(|targets| targets.iter().cloned().collect())
                .unwrap_or_default();
            self.compose_prompt(problem_statement, draft, *priority, reachable)
        }))
        .await;

        let mut agents = Vec::with_capacity(drafts.len() + 1);
        for (order, ((draft, (priority, priority_fallback)), prompt)) in
            drafts.iter().zip(priorities).zip(prompts).enumerate()
        {
            let (prompt, prompt_fallback) = prompt?;
            let targets = permissions.get(&draft.name).cloned().unwrap_or_default();
            agents.push(
                Agent::executor(draft.name.trim(), draft.role_type.trim(), order)
                    .with_responsibilities(non_empty(&draft.responsibilities))
                    .with_skills(non_empty(&draft.skills))
                    .with_output_requirements(draft.output_requirements.trim())
                    .with_priority(priority)
                    .with_permissions(targets)
                    .with_system_prompt(prompt)
                    .with_fallback(FallbackSource::Roles, roles_fallback)
                    .with_fallback(FallbackSource::Priority, priority_fallback)
                    .with_fallback(FallbackSource::Permissions, permissions_fallback)
                    .with_fallback(FallbackSource::Prompt, prompt_fallback),
            );
        }

        let target = agents
            .iter()
            .min_by(|a, b| by_priority_then_order(a, b))
            .map(|a| a.name().to_string())
            .ok_or_else(|| GameError::Schema("no executors after fallback".to_string()))?;
        let order = agents.len();
        agents.push(Agent::requester(problem_statement, &target, order));

        validate_agents(&agents)?;
        info!(
            executors = agents.len() - 1,
            requester_target = %target,
            roles_fallback,
            permissions_fallback,
            "role graph built"
        );
        Ok(agents)
    }

    async fn propose_roles(
        &self,
        problem_statement: &str,
        domain: &DomainConfig,
        desired: usize,
    ) -> Result<(Vec<RoleDraft>, bool)> {
        let Some(proposer) = &self.collaborators.role_proposer else {
            debug!("no role proposer configured; using minimal role set");
            return Ok((fallback::minimal_roles(domain, self.config.fallback_role_count), true));
        };

        let outcome = self
            .call_role_proposer(proposer, problem_statement, domain, desired)
            .await;
        Ok(match absorb(outcome)? {
            Some(drafts) => (drafts, false),
            None => (fallback::minimal_roles(domain, self.config.fallback_role_count), true),
        })
    }

    async fn call_role_proposer(
        &self,
        proposer: &Arc<dyn RoleProposer>,
        problem_statement: &str,
        domain: &DomainConfig,
        desired: usize,
    ) -> CollabResult<Vec<RoleDraft>> {
        let max = self.config.max_agent_count.max(1);
        call_with_retry("role_proposer", &self.calls, &self.cancel, |attempt| {
            let request = RoleProposalRequest {
                problem_statement: problem_statement.to_string(),
                domain: domain.clone(),
                desired_count: desired,
                strict: attempt.strict,
            };
            async move {
                let drafts = proposer.propose_roles(&request).await?;
                check_drafts(drafts, &self.keywords, max)
            }
        })
        .await
    }

    /// Proposed priority, else the estimator, else [`DEFAULT_PRIORITY`].
    async fn resolve_priority(&self, problem_statement: &str, draft: &RoleDraft) -> Result<(u8, bool)> {
        if let Some(p) = draft.priority_level.and_then(in_priority_range) {
            return Ok((p, false));
        }
        let Some(estimator) = &self.collaborators.priority_estimator else {
            return Ok((DEFAULT_PRIORITY, true));
        };
        let outcome = self.call_estimator(estimator, problem_statement, draft).await;
        Ok(match absorb(outcome)? {
            Some(p) => (p, false),
            None => (DEFAULT_PRIORITY, true),
        })
    }

    async fn call_estimator(
        &self,
        estimator: &Arc<dyn PriorityEstimator>,
        problem_statement: &str,
        draft: &RoleDraft,
    ) -> CollabResult<u8> {
        let request = PriorityRequest {
            problem_statement: problem_statement.to_string(),
            role: draft.clone(),
        };
        let request = &request;
        call_with_retry("priority_estimator", &self.calls, &self.cancel, |_| async move {
            let value = estimator.estimate_priority(request).await?;
            match in_priority_range(value) {
                Some(p) => Ok(p),
                None => bail!("estimated priority {value} outside 1..=10"),
            }
        })
        .await
    }

    async fn propose_permissions(
        &self,
        problem_statement: &str,
        drafts: &[RoleDraft],
        names: &[String],
    ) -> Result<(PermissionMap, bool)> {
        let Some(proposer) = &self.collaborators.permission_proposer else {
            debug!("no permission proposer configured; using full mesh");
            return Ok((fallback::full_mesh(names), true));
        };
        let outcome = self
            .call_permission_proposer(proposer, problem_statement, drafts, names)
            .await;
        Ok(match absorb(outcome)? {
            Some(map) => (map, false),
            None => (fallback::full_mesh(names), true),
        })
    }

    async fn call_permission_proposer(
        &self,
        proposer: &Arc<dyn PermissionProposer>,
        problem_statement: &str,
        drafts: &[RoleDraft],
        names: &[String],
    ) -> CollabResult<PermissionMap> {
        let known: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        call_with_retry("permission_proposer", &self.calls, &self.cancel, |attempt| {
            let request = PermissionProposalRequest {
                problem_statement: problem_statement.to_string(),
                roles: drafts.to_vec(),
                strict: attempt.strict,
            };
            let known = &known;
            async move {
                let map = proposer.propose_permissions(&request).await?;
                let mut cleaned = BTreeMap::new();
                for (from, targets) in map {
                    let from = from.trim().to_string();
                    if !known.contains(from.as_str()) {
                        bail!("permission source {from:?} is not a proposed role");
                    }
                    let mut set = BTreeSet::new();
                    for to in targets {
                        let to = to.trim().to_string();
                        if !known.contains(to.as_str()) {
                            bail!("permission target {to:?} is not a proposed role");
                        }
                        if to != from {
                            set.insert(to);
                        }
                    }
                    cleaned.insert(from, set);
                }
                Ok(cleaned)
            }
        })
        .await
    }

    /// Composed prompt, or the field template on failure.
    async fn compose_prompt(
        &self,
        problem_statement: &str,
        draft: &RoleDraft,
        priority: u8,
        reachable: Vec<String>,
    ) -> Result<(String, bool)> {
        let template = || fallback::template_prompt(problem_statement, draft, priority, &reachable);
        let Some(composer) = &self.collaborators.prompt_composer else {
            return Ok((template(), true));
        };
        let outcome = self
            .call_composer(composer, problem_statement, draft, &reachable)
            .await;
        Ok(match absorb(outcome)? {
            Some(prompt) => (prompt, false),
            None => (template(), true),
        })
    }

    async fn call_composer(
        &self,
        composer: &Arc<dyn PromptComposer>,
        problem_statement: &str,
        draft: &RoleDraft,
        reachable: &[String],
    ) -> CollabResult<String> {
        call_with_retry("prompt_composer", &self.calls, &self.cancel, |attempt| {
            let request = PromptRequest {
                problem_statement: problem_statement.to_string(),
                role: draft.clone(),
                reachable: reachable.to_vec(),
                strict: attempt.strict,
            };
            async move {
                let prompt = composer.compose_prompt(&request).await?;
                let prompt = prompt.trim();
                if prompt.is_empty() {
                    bail!("empty system prompt for {}", request.role.name);
                }
                Ok(prompt.to_string())
            }
        })
        .await
    }
}

/// Validate proposer output. Requester-like drafts are dropped; anything
/// else wrong makes the whole response malformed.
fn check_drafts(
    drafts: Vec<RoleDraft>,
    keywords: &KeywordPolicy,
    max: usize,
) -> anyhow::Result<Vec<RoleDraft>> {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(drafts.len());
    for mut draft in drafts {
        draft.name = draft.name.trim().to_string();
        draft.role_type = draft.role_type.trim().to_string();
        let name = draft.name.as_str();
        let role_type = draft.role_type.as_str();
        if keywords.is_requester_like(name) || keywords.is_requester_like(role_type) {
            warn!(name, role_type, "role proposer emitted a requester-like role; dropped");
            continue;
        }
        if name.is_empty() || role_type.is_empty() {
            bail!("role draft missing name or role_type");
        }
        if name == REQUESTER_NAME {
            bail!("role name {name:?} is reserved");
        }
        if draft.responsibilities.iter().all(|r| r.trim().is_empty()) {
            bail!("role {name:?} has no responsibilities");
        }
        if let Some(p) = draft.priority_level {
            if in_priority_range(p).is_none() {
                bail!("role {name:?} priority {p} outside 1..=10");
            }
        }
        if !seen.insert(name.to_string()) {
            bail!("duplicate role name {name:?}");
        }
        kept.push(draft);
    }
    if kept.is_empty() {
        bail!("no usable roles proposed");
    }
    if kept.len() > max {
        warn!(proposed = kept.len(), max, "truncating proposed roles");
        kept.truncate(max);
    }
    Ok(kept)
}

/// Structural invariants of a finished agent set.
pub fn validate_agents(agents: &[Agent]) -> Result<()> {
    let executors: Vec<&Agent> = agents.iter().filter(|a| a.is_executor()).collect();
    if executors.is_empty() {
        return Err(GameError::Schema("graph has no executors".to_string()));
    }

    let mut names = BTreeSet::new();
    for agent in agents {
        if agent.name().trim().is_empty() || agent.role_type().trim().is_empty() {
            return Err(GameError::Schema(format!(
                "agent #{} is missing a name or role_type",
                agent.creation_order()
            )));
        }
        if !names.insert(agent.name()) {
            return Err(GameError::Schema(format!(
                "duplicate agent name: {}",
                agent.name()
            )));
        }
        if !PRIORITY_RANGE.contains(&agent.priority_level()) {
            return Err(GameError::Schema(format!(
                "agent {} priority {} outside 1..=10",
                agent.name(),
                agent.priority_level()
            )));
        }
    }

    let requesters: Vec<&Agent> = agents.iter().filter(|a| a.is_requester()).collect();
    let [requester] = requesters.as_slice() else {
        return Err(GameError::Schema(format!(
            "expected exactly one requester, found {}",
            requesters.len()
        )));
    };

    let top = executors
        .iter()
        .copied()
        .min_by(|a, b| by_priority_then_order(a, b))
        .map(Agent::name);
    let targets: Vec<&String> = requester.connection_permissions().iter().collect();
    match (targets.as_slice(), top) {
        ([only], Some(top)) if only.as_str() == top => Ok(()),
        _ => Err(GameError::Schema(format!(
            "requester must have exactly one edge, to {}",
            top.unwrap_or("-")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, role_type: &str, priority: Option<i64>) -> RoleDraft {
        RoleDraft {
            name: name.to_string(),
            role_type: role_type.to_string(),
            responsibilities: vec!["do things".to_string()],
            priority_level: priority,
            ..RoleDraft::default()
        }
    }

    #[test]
    fn test_check_drafts_drops_requester_like_roles() {
        let kept = check_drafts(
            vec![draft("user", "user", Some(5)), draft("dev", "developer", Some(6))],
            &KeywordPolicy::default(),
            10,
        )
        .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "dev");
    }

    #[test]
    fn test_check_drafts_rejects_duplicates_and_bad_priority() {
        let policy = KeywordPolicy::default();
        assert!(check_drafts(vec![draft("a", "x", None), draft("a", "y", None)], &policy, 10).is_err());
        assert!(check_drafts(vec![draft("a", "x", Some(11))], &policy, 10).is_err());
        assert!(check_drafts(vec![draft("user", "client", None)], &policy, 10).is_err());
    }

    #[test]
    fn test_check_drafts_truncates_to_max() {
        let drafts = (0..5).map(|i| draft(&format!("r{i}"), "worker", None)).collect();
        let kept = check_drafts(drafts, &KeywordPolicy::default(), 3).unwrap();
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_validate_agents_rejects_duplicate_names() {
        let agents = vec![
            Agent::executor("a", "x", 0),
            Agent::executor("a", "y", 1),
            Agent::requester("p", "a", 2),
        ];
        let err = validate_agents(&agents).unwrap_err();
        assert!(err.to_string().contains("duplicate agent name"));
    }

    #[test]
    fn test_validate_agents_requires_requester_edge_to_top_priority() {
        let agents = vec![
            Agent::executor("a", "x", 0).with_priority(3),
            Agent::executor("b", "y", 1).with_priority(9),
            Agent::requester("p", "a", 2),
        ];
        assert!(matches!(validate_agents(&agents), Err(GameError::Schema(_))));
    }

    #[test]
    fn test_validate_agents_requires_one_requester() {
        let agents = vec![Agent::executor("a", "x", 0)];
        let err = validate_agents(&agents).unwrap_err();
        assert!(err.to_string().contains("exactly one requester"));
    }
}
