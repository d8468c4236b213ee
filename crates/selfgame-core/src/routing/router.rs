//! Signal router: graph validation, forbidden-path policy and the
//! communication matrix.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use selfgame_collab::{CallPolicy, CancelSignal, Collaborators, EdgeRef, ForbiddenEdgeProposer};

use crate::config::{ForbiddenPathPolicy, GameConfig, KeywordPolicy, RoutingConfig};
use crate::domain::{Agent, GameError, Result};
use crate::obs;
use crate::routing::policy;
use crate::routing::{CommunicationMatrix, InteractionGraph};

/// Which edge set an unknown endpoint was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSet {
    Allowed,
    Forbidden,
}

/// A problem found while validating the graph. Conflicts are resolved
/// automatically and reported; none of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingConflict {
    /// Edge was both allowed and forbidden; removed from allowed.
    AllowedAndForbidden { from: String, to: String },
    /// Edge endpoint is not an agent; the edge was dropped.
    UnknownEndpoint {
        from: String,
        to: String,
        set: EdgeSet,
    },
    /// Attempt to forbid a self-loop or the requester edge; ignored.
    ProtectedEdge { from: String, to: String },
    /// Agent has no edge to or from any other agent. Agents without
    /// outgoing edges that others can reach are sinks and are not flagged.
    IsolatedAgent { agent: String },
}

impl fmt::Display for RoutingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingConflict::AllowedAndForbidden { from, to } => {
                write!(f, "{from} -> {to} is both allowed and forbidden; forbidding wins")
            }
            RoutingConflict::UnknownEndpoint { from, to, set } => {
                write!(f, "{from} -> {to} ({set:?}) names an unknown agent; dropped")
            }
            RoutingConflict::ProtectedEdge { from, to } => {
                write!(f, "{from} -> {to} is protected and cannot be forbidden")
            }
            RoutingConflict::IsolatedAgent { agent } => {
                write!(f, "{agent} has no edge to or from any other agent")
            }
        }
    }
}

/// A validated graph ready for dispatch.
#[derive(Debug, Clone)]
pub struct RoutedGraph {
    pub graph: InteractionGraph,
    pub matrix: CommunicationMatrix,
    pub conflicts: Vec<RoutingConflict>,
    /// The proposed forbidden-edge policy fell back to "no forbidden edges".
    pub fallback_used: bool,
}

/// Builds and validates the communication graph for one session.
pub struct SignalRouter {
    config: RoutingConfig,
    keywords: KeywordPolicy,
    calls: CallPolicy,
    proposer: Option<Arc<dyn ForbiddenEdgeProposer>>,
    cancel: CancelSignal,
}

impl SignalRouter {
    pub fn new(config: &GameConfig, collaborators: &Collaborators) -> Self {
        Self {
            config: config.routing.clone(),
            keywords: config.keywords.clone(),
            calls: config.calls,
            proposer: collaborators.forbidden_edge_proposer.clone(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Adjacency from each agent's permissions plus executor self-loops,
    /// with no policy applied.
    pub fn build_matrix(&self, agents: &[Agent]) -> CommunicationMatrix {
        let graph = InteractionGraph::from_agents(agents.to_vec());
        CommunicationMatrix::new(graph.agents(), graph.allowed_edges())
    }

    /// Resolve the graph in place and report what was changed.
    ///
    /// Afterwards every edge names known agents, allowed ∩ forbidden = ∅,
    /// and agent permissions mirror the allowed set.
    pub fn validate(&self, graph: &mut InteractionGraph) -> Vec<RoutingConflict> {
        let names: BTreeSet<String> = graph.agents().iter().map(|a| a.name().to_string()).collect();
        let requester = graph.requester().map(|r| r.name().to_string());
        let mut conflicts = Vec::new();

        drop_unknown(EdgeSet::Allowed, graph.allowed_mut(), &names, &mut conflicts);
        drop_unknown(EdgeSet::Forbidden, graph.forbidden_mut(), &names, &mut conflicts);

        let protected: Vec<EdgeRef> = graph
            .forbidden_edges()
            .iter()
            .filter(|e| e.from == e.to || requester.as_deref() == Some(e.from.as_str()))
            .cloned()
            .collect();
        for edge in protected {
            graph.forbidden_mut().remove(&edge);
            conflicts.push(RoutingConflict::ProtectedEdge {
                from: edge.from,
                to: edge.to,
            });
        }

        let overlapping: Vec<EdgeRef> = graph
            .forbidden_edges()
            .intersection(graph.allowed_edges())
            .cloned()
            .collect();
        for edge in overlapping {
            graph.allowed_mut().remove(&edge);
            conflicts.push(RoutingConflict::AllowedAndForbidden {
                from: edge.from,
                to: edge.to,
            });
        }

        graph.sync_permissions();

        // An agent with no outgoing edge is a sink while some other agent
        // can reach it. Only agents with no edge in either direction,
        // self-loops aside, are flagged.
        for agent in graph.agents() {
            let connected = graph
                .allowed_edges()
                .iter()
                .any(|e| e.from != e.to && (e.from == agent.name() || e.to == agent.name()));
            if !connected {
                conflicts.push(RoutingConflict::IsolatedAgent {
                    agent: agent.name().to_string(),
                });
            }
        }

        for conflict in &conflicts {
            obs::emit_routing_conflict(conflict);
        }
        conflicts
    }

    /// Apply the configured forbidden-path policy, validate, and build the
    /// matrix.
    pub async fn route(&self, agents: Vec<Agent>) -> Result<RoutedGraph> {
        let mut graph = InteractionGraph::from_agents(agents);
        let mut fallback_used = false;

        let proposed = match self.config.forbidden_path_policy {
            ForbiddenPathPolicy::Off => Vec::new(),
            ForbiddenPathPolicy::Heuristic => {
                policy::heuristic_forbidden(&graph, &self.config, &self.keywords)
            }
            ForbiddenPathPolicy::Proposed => match &self.proposer {
                Some(proposer) => {
                    match policy::proposed_forbidden(&graph, proposer.as_ref(), &self.calls, &self.cancel)
                        .await
                    {
                        Ok(edges) => edges,
                        Err(e) if e.is_cancelled() => return Err(GameError::Cancelled),
                        Err(e) => {
                            obs::emit_fallback_used(e.call(), &e.to_string());
                            fallback_used = true;
                            Vec::new()
                        }
                    }
                }
                None => {
                    debug!("no forbidden-edge proposer configured; forbidding nothing");
                    fallback_used = true;
                    Vec::new()
                }
            },
        };
        for edge in proposed {
            graph.forbid(edge);
        }

        let conflicts = self.validate(&mut graph);
        let matrix = CommunicationMatrix::new(graph.agents(), graph.allowed_edges());
        Ok(RoutedGraph {
            graph,
            matrix,
            conflicts,
            fallback_used,
        })
    }
}

fn drop_unknown(
    set: EdgeSet,
    edges: &mut BTreeSet<EdgeRef>,
    names: &BTreeSet<String>,
    conflicts: &mut Vec<RoutingConflict>,
) {
    edges.retain(|e| {
        let known = names.contains(&e.from) && names.contains(&e.to);
        if !known {
            conflicts.push(RoutingConflict::UnknownEndpoint {
                from: e.from.clone(),
                to: e.to.clone(),
                set,
            });
        }
        known
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> SignalRouter {
        SignalRouter::new(&GameConfig::default(), &Collaborators::none())
    }

    fn agents() -> Vec<Agent> {
        vec![
            Agent::executor("a", "analyst", 0).with_permissions(["b", "ghost"]),
            Agent::executor("b", "builder", 1).with_permissions(["a"]),
            Agent::requester("p", "a", 2),
        ]
    }

    #[test]
    fn test_forbidding_wins_over_allowed() {
        let mut graph = InteractionGraph::from_agents(agents());
        graph.forbid(EdgeRef::new("a", "b"));
        let conflicts = router().validate(&mut graph);

        assert!(!graph.is_allowed("a", "b"));
        assert!(graph.forbidden_edges().contains(&EdgeRef::new("a", "b")));
        assert!(conflicts.contains(&RoutingConflict::AllowedAndForbidden {
            from: "a".into(),
            to: "b".into()
        }));
        assert!(!graph.agent("a").unwrap().connection_permissions().contains("b"));
    }

    #[test]
    fn test_unknown_endpoints_are_reported_and_dropped() {
        let mut graph = InteractionGraph::from_agents(agents());
        let conflicts = router().validate(&mut graph);
        assert!(!graph.is_allowed("a", "ghost"));
        assert!(matches!(
            conflicts.as_slice(),
            [RoutingConflict::UnknownEndpoint { to, set: EdgeSet::Allowed, .. }] if to == "ghost"
        ));
    }

    #[test]
    fn test_requester_edge_and_self_loops_are_protected() {
        let mut graph = InteractionGraph::from_agents(agents());
        graph.forbid(EdgeRef::new("requester", "a"));
        graph.forbid(EdgeRef::new("b", "b"));
        let conflicts = router().validate(&mut graph);
        assert!(graph.is_allowed("requester", "a"));
        assert!(graph.is_allowed("b", "b"));
        let protected = conflicts
            .iter()
            .filter(|c| matches!(c, RoutingConflict::ProtectedEdge { .. }))
            .count();
        assert_eq!(protected, 2);
    }

    #[test]
    fn test_isolated_agent_is_flagged_not_dropped() {
        let mut all = agents();
        all.push(Agent::executor("loner", "hermit", 3));
        let mut graph = InteractionGraph::from_agents(all);
        let conflicts = router().validate(&mut graph);
        assert!(graph.contains("loner"));
        assert!(conflicts.contains(&RoutingConflict::IsolatedAgent {
            agent: "loner".into()
        }));
    }

    #[test]
    fn test_reachable_sink_is_not_isolated() {
        let mut graph = InteractionGraph::from_agents(vec![
            Agent::executor("a", "analyst", 0).with_permissions(["b", "sink"]),
            Agent::executor("b", "builder", 1).with_permissions(["a"]),
            Agent::executor("sink", "archivist", 2),
            Agent::executor("loner", "hermit", 3),
            Agent::requester("p", "a", 4),
        ]);
        let conflicts = router().validate(&mut graph);
        let isolated: Vec<&str> = conflicts
            .iter()
            .filter_map(|c| match c {
                RoutingConflict::IsolatedAgent { agent } => Some(agent.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(isolated, vec!["loner"]);
    }

    #[test]
    fn test_conflict_serializes_with_kind_tag() {
        let value = serde_json::to_value(RoutingConflict::IsolatedAgent {
            agent: "x".into(),
        })
        .unwrap();
        assert_eq!(value["kind"], "isolated_agent");
    }
}
