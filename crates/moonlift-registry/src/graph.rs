//! Package import graph.
//!
//! Uses a `petgraph::DiGraph` with one node per import path and an edge from
//! each importer to each package it imports.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::importer::ImportError;

/// Import relationships between packages.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: FxHashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, path: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.nodes.insert(path.to_string(), idx);
        idx
    }

    /// Add a package and edges to everything it imports.
    pub fn add_package<S: AsRef<str>>(&mut self, path: &str, imports: &[S]) {
        let from = self.node(path);
        for import in imports {
            let to = self.node(import.as_ref());
            if !self.graph.contains_edge(from, to) {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Packages ordered so every package follows the packages it imports.
    pub fn build_order(&self) -> Result<Vec<String>, ImportError> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| ImportError::Cycle {
            path: self.graph[cycle.node_id()].clone(),
        })?;
        // Edges point importer -> imported, so dependencies come last.
        Ok(sorted
            .into_iter()
            .rev()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }
}
