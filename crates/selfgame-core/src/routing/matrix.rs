//! Boolean adjacency matrix over the agents of a graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use selfgame_collab::EdgeRef;

use crate::domain::Agent;

/// Read-only reachability over agents, indexed in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationMatrix {
    names: Vec<String>,
    index: BTreeMap<String, usize>,
    cells: Vec<Vec<bool>>,
}

impl CommunicationMatrix {
    /// Build from agents and the edges to mark. Edges naming unknown agents
    /// are ignored.
    pub fn new<'e>(agents: &[Agent], edges: impl IntoIterator<Item = &'e EdgeRef>) -> Self {
        let mut ordered: Vec<&Agent> = agents.iter().collect();
        ordered.sort_by_key(|a| a.creation_order());

        let names: Vec<String> = ordered.iter().map(|a| a.name().to_string()).collect();
        let index: BTreeMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let mut cells = vec![vec![false; names.len()]; names.len()];
        for edge in edges {
            if let (Some(&i), Some(&j)) = (index.get(&edge.from), index.get(&edge.to)) {
                cells[i][j] = true;
            }
        }
        Self {
            names,
            index,
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Agent names in creation order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn can_reach(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&i), Some(&j)) => self.cells[i][j],
            _ => false,
        }
    }

    /// Direct successors of `from`, in creation order.
    pub fn neighbours(&self, from: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(from) else {
            return Vec::new();
        };
        self.cells[i]
            .iter()
            .enumerate()
            .filter(|&(_, &set)| set)
            .map(|(j, _)| self.names[j].as_str())
            .collect()
    }

    pub fn out_degree(&self, name: &str) -> usize {
        self.index
            .get(name)
            .map(|&i| self.cells[i].iter().filter(|&&c| c).count())
            .unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&c| c).count()
    }

    /// Rows of the matrix, for export.
    pub fn rows(&self) -> &[Vec<bool>] {
        &self.cells
    }
}
