//! Provides/requires validation and build-order linearization.
//!
//! Every item is a node. An edge runs from the item that provides a path to
//! each item that requires it, weighted with that path. Validation rejects
//! paths provided twice and requirements nobody satisfies; ordering is Kahn's
//! algorithm with ties broken by declaration index, so equal inputs always
//! produce equal plans.

use crate::items::ImageItem;
use crate::CoreError;
use layerc_schema::{ImagePath, Provides, Requires};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

/// The facts of one node, detached from the item that declared them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFacts {
    pub target: String,
    pub provides: Vec<Provides>,
    pub requires: Vec<Requires>,
}

impl NodeFacts {
    pub fn of(item: &dyn ImageItem) -> Self {
        Self {
            target: item.from_target().to_string(),
            provides: item.provides(),
            requires: item.requires(),
        }
    }
}

/// A validated dependency graph over node indexes `0..n`.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<usize, ImagePath>,
    targets: Vec<String>,
}

impl DependencyGraph {
    /// Check the facts of `nodes` and connect providers to requirers.
    pub fn build(nodes: &[NodeFacts]) -> Result<Self, CoreError> {
        let mut providers: BTreeMap<&ImagePath, (&Provides, usize)> = BTreeMap::new();
        for (ix, node) in nodes.iter().enumerate() {
            for fact in &node.provides {
                if let Some(&(_, first)) = providers.get(fact.path()) {
                    return Err(CoreError::Conflict {
                        path: fact.path().clone(),
                        first: nodes[first].target.clone(),
                        second: node.target.clone(),
                    });
                }
                providers.insert(fact.path(), (fact, ix));
            }
        }

        let mut graph = DiGraph::with_capacity(nodes.len(), 0);
        for ix in 0..nodes.len() {
            graph.add_node(ix);
        }

        for (ix, node) in nodes.iter().enumerate() {
            for req in &node.requires {
                match providers.get(req.path()) {
                    Some(&(fact, provider)) if fact.satisfies(req) => {
                        graph.add_edge(
                            NodeIndex::new(provider),
                            NodeIndex::new(ix),
                            req.path().clone(),
                        );
                    }
                    Some(&(fact, provider)) => {
                        return Err(CoreError::MissingRequirement {
                            target: node.target.clone(),
                            requirement: req.clone(),
                            detail: format!(
                                " ({} is provided as a {} by {})",
                                req.path(),
                                fact.kind(),
                                nodes[provider].target
                            ),
                        });
                    }
                    None => {
                        return Err(CoreError::MissingRequirement {
                            target: node.target.clone(),
                            requirement: req.clone(),
                            detail: String::new(),
                        });
                    }
                }
            }
        }

        debug!(
            "dependency graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self {
            graph,
            targets: nodes.iter().map(|n| n.target.clone()).collect(),
        })
    }

    /// Topological order of node indexes; the lowest ready index goes first.
    pub fn order(&self) -> Result<Vec<usize>, CoreError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(ix, _)| Reverse(ix))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(ix)) = ready.pop() {
            order.push(ix);
            for edge in self
                .graph
                .edges_directed(NodeIndex::new(ix), Direction::Outgoing)
            {
                let next = edge.target().index();
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() == in_degree.len() {
            Ok(order)
        } else {
            Err(self.cycle_error())
        }
    }

    fn cycle_error(&self) -> CoreError {
        for mut members in kosaraju_scc(&self.graph) {
            members.sort_unstable();
            let inner_edge = self.graph.edge_references().find(|e| {
                members.binary_search(&e.source()).is_ok()
                    && members.binary_search(&e.target()).is_ok()
            });
            if let Some(edge) = inner_edge {
                let targets: Vec<&str> = members
                    .iter()
                    .map(|n| self.targets[n.index()].as_str())
                    .collect();
                return CoreError::Cycle {
                    path: edge.weight().clone(),
                    targets: targets.join(", "),
                };
            }
        }
        CoreError::Cycle {
            path: ImagePath::root(),
            targets: self.targets.join(", "),
        }
    }
}

/// Validate `nodes` and return their build order.
pub fn dependency_order(nodes: &[NodeFacts]) -> Result<Vec<usize>, CoreError> {
    DependencyGraph::build(nodes)?.order()
}
