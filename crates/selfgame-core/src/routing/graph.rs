//! The interaction graph: agents plus allowed and forbidden edge sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use selfgame_collab::EdgeRef;

use crate::domain::Agent;

/// Agents and their directed communication edges.
///
/// After [`crate::routing::SignalRouter::validate`] the allowed and
/// forbidden sets are disjoint and every endpoint names a known agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionGraph {
    agents: Vec<Agent>,
    allowed: BTreeSet<EdgeRef>,
    forbidden: BTreeSet<EdgeRef>,
}

impl InteractionGraph {
    /// Allowed edges come from each agent's `connection_permissions`; every
    /// executor also gets its self-loop.
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        let mut allowed = BTreeSet::new();
        for agent in &agents {
            for target in agent.connection_permissions() {
                allowed.insert(EdgeRef::new(agent.name(), target.as_str()));
            }
            if agent.is_executor() {
                allowed.insert(EdgeRef::new(agent.name(), agent.name()));
            }
        }
        Self {
            agents,
            allowed,
            forbidden: BTreeSet::new(),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agent(name).is_some()
    }

    pub fn requester(&self) -> Option<&Agent> {
        self.agents.iter().find(|a| a.is_requester())
    }

    pub fn executors(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.is_executor())
    }

    pub fn allowed_edges(&self) -> &BTreeSet<EdgeRef> {
        &self.allowed
    }

    pub fn forbidden_edges(&self) -> &BTreeSet<EdgeRef> {
        &self.forbidden
    }

    pub fn is_allowed(&self, from: &str, to: &str) -> bool {
        self.allowed.contains(&EdgeRef::new(from, to))
    }

    /// Mark an edge as forbidden. Resolution against the allowed set happens
    /// in validation.
    pub fn forbid(&mut self, edge: EdgeRef) {
        self.forbidden.insert(edge);
    }

    pub(crate) fn allowed_mut(&mut self) -> &mut BTreeSet<EdgeRef> {
        &mut self.allowed
    }

    pub(crate) fn forbidden_mut(&mut self) -> &mut BTreeSet<EdgeRef> {
        &mut self.forbidden
    }

    /// Rewrite each agent's permissions from the allowed set. Self-loops
    /// stay implicit.
    pub(crate) fn sync_permissions(&mut self) {
        let allowed = &self.allowed;
        for agent in &mut self.agents {
            let targets: BTreeSet<String> = allowed
                .iter()
                .filter(|e| e.from == agent.name() && e.to != agent.name())
                .map(|e| e.to.clone())
                .collect();
            if &targets != agent.connection_permissions() {
                agent.set_connection_permissions(targets);
            }
        }
    }
}
