//! Graph declaration and compilation (spec.md §4.2).
//!
//! Grounded on `graph/state_graph.rs`'s `StateGraph::add_node/add_edge/
//! add_conditional_edges/compile`, generalized from a single linear chain
//! (`from -> to`, one conditional router with a `path_map`) to a
//! concurrent-frontier DAG (`from -> [to]`, a non-empty start *set*, routers
//! returning `RoutingDecision::{End, UseGraphEdges, Nodes(set)}`).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::compile_error::CompilationError;
use super::node::{Node, Router};

/// Declares nodes, static edges, optional routers and the start frontier.
/// `compile` validates the declaration and produces an immutable
/// [`CompiledGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Vec<String>>,
    routers: HashMap<String, Arc<dyn Router>>,
    start: HashSet<String>,
    duplicate_node_id: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) && self.duplicate_node_id.is_none() {
            self.duplicate_node_id = Some(id.clone());
        }
        self.nodes.insert(id, node);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.entry(from.into()).or_default().push(to.into());
        self
    }

    pub fn add_router(mut self, node_id: impl Into<String>, router: Arc<dyn Router>) -> Self {
        self.routers.insert(node_id.into(), router);
        self
    }

    pub fn start_frontier<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.start = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, CompilationError> {
        if let Some(id) = self.duplicate_node_id {
            return Err(CompilationError::DuplicateNodeId(id));
        }
        if self.start.is_empty() {
            return Err(CompilationError::EmptyStartFrontier);
        }
        for id in &self.start {
            if !self.nodes.contains_key(id) {
                return Err(CompilationError::UnknownStartNode(id.clone()));
            }
        }
        for (from, targets) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(CompilationError::UnknownEdgeTarget(from.clone()));
            }
            for to in targets {
                if !self.nodes.contains_key(to) {
                    return Err(CompilationError::UnknownEdgeTarget(to.clone()));
                }
            }
        }
        for node_id in self.routers.keys() {
            if !self.nodes.contains_key(node_id) {
                return Err(CompilationError::RouterOnUnknownNode(node_id.clone()));
            }
        }

        let reachable = reachable_from(&self.start, &self.edges);
        for node_id in self.nodes.keys() {
            if !reachable.contains(node_id) {
                return Err(CompilationError::UnreachableNode(node_id.clone()));
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            routers: self.routers,
            start: self.start,
        })
    }
}

fn reachable_from(start: &HashSet<String>, edges: &HashMap<String, Vec<String>>) -> HashSet<String> {
    let mut seen: HashSet<String> = start.clone();
    let mut queue: VecDeque<String> = start.iter().cloned().collect();
    while let Some(node) = queue.pop_front() {
        if let Some(targets) = edges.get(&node) {
            for target in targets {
                if seen.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
    }
    seen
}

/// A validated graph, ready to be driven by the scheduler.
pub struct CompiledGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Vec<String>>,
    routers: HashMap<String, Arc<dyn Router>>,
    start: HashSet<String>,
}

impl CompiledGraph {
    pub fn start_frontier(&self) -> HashSet<String> {
        self.start.clone()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    pub fn static_edges(&self, id: &str) -> Vec<String> {
        self.edges.get(id).cloned().unwrap_or_default()
    }

    pub fn router(&self, id: &str) -> Option<&Arc<dyn Router>> {
        self.routers.get(id)
    }
}
