//! Forbidden-edge strategies.
//!
//! Both strategies only propose edges; the router's validation decides what
//! is actually removed.

use std::collections::BTreeSet;

use anyhow::bail;
use tracing::debug;

use selfgame_collab::{
    call_with_retry, CallPolicy, CancelSignal, CollabResult, EdgeRef, ForbiddenEdgeProposer,
    ForbiddenEdgeRequest,
};

use crate::config::{KeywordPolicy, RoutingConfig};
use crate::domain::Agent;
use crate::routing::InteractionGraph;
use crate::text;

fn responsibility_tokens(agent: &Agent) -> BTreeSet<String> {
    agent
        .responsibilities()
        .iter()
        .flat_map(|duty| text::tokenize(duty))
        .collect()
}

fn stage_text(agent: &Agent) -> String {
    let mut out = agent.identity_text();
    for duty in agent.responsibilities() {
        out.push(' ');
        out.push_str(duty);
    }
    out
}

/// Forbid executor-to-executor edges whose endpoints share too little
/// responsibility vocabulary or sit too many work stages apart. Skills are
/// not compared; agents without responsibilities skip the similarity check.
pub fn heuristic_forbidden(
    graph: &InteractionGraph,
    routing: &RoutingConfig,
    keywords: &KeywordPolicy,
) -> Vec<EdgeRef> {
    let mut out = Vec::new();
    for edge in graph.allowed_edges() {
        if edge.from == edge.to {
            continue;
        }
        let (Some(from), Some(to)) = (graph.agent(&edge.from), graph.agent(&edge.to)) else {
            continue;
        };
        if from.is_requester() || to.is_requester() {
            continue;
        }

        let (a, b) = (responsibility_tokens(from), responsibility_tokens(to));
        if !a.is_empty() && !b.is_empty() {
            let similarity = text::jaccard(&a, &b);
            if similarity < routing.min_responsibility_similarity {
                debug!(from = %edge.from, to = %edge.to, similarity, "low responsibility similarity");
                out.push(edge.clone());
                continue;
            }
        }

        if let (Some(sa), Some(sb)) = (
            keywords.stage_of(&stage_text(from)),
            keywords.stage_of(&stage_text(to)),
        ) {
            if sa.abs_diff(sb) > routing.max_stage_gap {
                debug!(from = %edge.from, to = %edge.to, sa, sb, "stage mismatch");
                out.push(edge.clone());
            }
        }
    }
    out
}

/// Ask a [`ForbiddenEdgeProposer`] for candidate edges. Edges naming
/// unknown agents make the response malformed.
pub async fn proposed_forbidden(
    graph: &InteractionGraph,
    proposer: &dyn ForbiddenEdgeProposer,
    calls: &CallPolicy,
    cancel: &CancelSignal,
) -> CollabResult<Vec<EdgeRef>> {
    let roles: Vec<_> = graph.agents().iter().map(Agent::to_draft).collect();
    let allowed: Vec<EdgeRef> = graph.allowed_edges().iter().cloned().collect();

    call_with_retry("forbidden_edge_proposer", calls, cancel, |attempt| {
        let request = ForbiddenEdgeRequest {
            roles: roles.clone(),
            allowed: allowed.clone(),
            strict: attempt.strict,
        };
        async move {
            let edges = proposer.propose_forbidden(&request).await?;
            for edge in &edges {
                if !graph.contains(&edge.from) || !graph.contains(&edge.to) {
                    bail!("forbidden edge {} -> {} names an unknown agent", edge.from, edge.to);
                }
            }
            Ok(edges)
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> InteractionGraph {
        InteractionGraph::from_agents(vec![
            Agent::executor("researcher", "analyst", 0)
                .with_responsibilities(["research market data"])
                .with_skills(["statistics"])
                .with_permissions(["designer", "operator"]),
            Agent::executor("designer", "designer", 1)
                .with_responsibilities(["design market dashboards"])
                .with_skills(["statistics", "ux"])
                .with_permissions(["researcher"]),
            Agent::executor("operator", "ops", 2)
                .with_responsibilities(["deploy services"])
                .with_skills(["kubernetes"])
                .with_permissions(["researcher"]),
            Agent::requester("p", "researcher", 3),
        ])
    }

    #[test]
    fn test_heuristic_forbids_unrelated_pairs_only() {
        let forbidden = heuristic_forbidden(
            &graph(),
            &RoutingConfig::default(),
            &KeywordPolicy::default(),
        );
        assert!(forbidden.contains(&EdgeRef::new("researcher", "operator")));
        assert!(forbidden.contains(&EdgeRef::new("operator", "researcher")));
        assert!(!forbidden.contains(&EdgeRef::new("researcher", "designer")));
        assert!(forbidden.iter().all(|e| e.from != e.to));
        assert!(forbidden.iter().all(|e| e.from != "requester"));
    }

    #[test]
    fn test_shared_skills_do_not_rescue_unrelated_responsibilities() {
        let graph = InteractionGraph::from_agents(vec![
            Agent::executor("a", "x", 0)
                .with_skills(["rust"])
                .with_responsibilities(["write parsers"])
                .with_permissions(["b"]),
            Agent::executor("b", "y", 1)
                .with_skills(["rust"])
                .with_responsibilities(["review invoices"])
                .with_permissions(["a"]),
            Agent::requester("p", "a", 2),
        ]);
        let forbidden =
            heuristic_forbidden(&graph, &RoutingConfig::default(), &KeywordPolicy::default());
        assert!(forbidden.contains(&EdgeRef::new("a", "b")));
        assert!(forbidden.contains(&EdgeRef::new("b", "a")));
    }

    #[test]
    fn test_agents_without_responsibilities_skip_similarity() {
        let graph = InteractionGraph::from_agents(vec![
            Agent::executor("a", "x", 0)
                .with_skills(["rust"])
                .with_permissions(["b"]),
            Agent::executor("b", "y", 1)
                .with_skills(["accounting"])
                .with_permissions(["a"]),
            Agent::requester("p", "a", 2),
        ]);
        let forbidden =
            heuristic_forbidden(&graph, &RoutingConfig::default(), &KeywordPolicy::default());
        assert!(forbidden.is_empty());
    }
}
