//! Graph builder: collect nodes and edges, validate, produce a compiled graph.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use super::compile_error::CompilationError;
use super::compiled::CompiledStateGraph;
use super::conditional::{ConditionalRouter, NextEntry, RouterFn};
use super::node::Node;

/// Sentinel for graph entry: `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: `add_edge(last_node_id, END)`.
pub const END: &str = "__end__";

/// Default bound on transitions per invoke; guarantees termination even with
/// cycles in the retry topology.
pub const DEFAULT_RECURSION_LIMIT: usize = 50;

/// Builder for an agent state machine.
///
/// A node may have either one outgoing `add_edge` or `add_conditional_edges`,
/// not both. Nodes that route themselves via `Next::Node`/`Next::End` still
/// need one outgoing edge for validation; it serves as the `Next::Continue`
/// route.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: Vec<(String, String)>,
    conditional_edges: HashMap<String, ConditionalRouter<S>>,
    recursion_limit: usize,
}

impl<S> Default for StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: HashMap::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Overrides the transition bound.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// Adds a node; replaces any node with the same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an edge. Use [`START`] and [`END`] for entry/exit.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source`: after the node runs, `path` is
    /// called with the updated state and its key picks the next node, mapped
    /// through `path_map` when given.
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        path: RouterFn<S>,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional_edges
            .insert(source.into(), ConditionalRouter::new(path, path_map));
        self
    }

    /// Validates the graph and produces an executable form.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        for (source, router) in &self.conditional_edges {
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
            if let Some(path_map) = &router.path_map {
                for target in path_map.values() {
                    if target != END && !self.nodes.contains_key(target) {
                        return Err(CompilationError::InvalidConditionalTarget(target.clone()));
                    }
                }
            }
        }

        let start_edges: Vec<&String> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t)
            .collect();
        let first = match start_edges.as_slice() {
            [] => return Err(CompilationError::MissingStart),
            [one] => (*one).clone(),
            _ => return Err(CompilationError::AmbiguousStart),
        };

        let has_end = self.edges.iter().any(|(_, t)| t == END)
            || self.conditional_edges.values().any(|r| {
                r.path_map
                    .as_ref()
                    .map_or(true, |m| m.values().any(|v| v == END))
            });
        if !has_end {
            return Err(CompilationError::MissingEnd);
        }

        let mut seen_from: HashSet<&String> = HashSet::new();
        for (from, _) in self.edges.iter().filter(|(f, _)| f != START) {
            if !seen_from.insert(from) {
                return Err(CompilationError::DuplicateEdge(from.clone()));
            }
            if self.conditional_edges.contains_key(from) {
                return Err(CompilationError::NodeHasBothEdgeAndConditional(from.clone()));
            }
        }

        let mut next_map: HashMap<String, NextEntry<S>> = self
            .edges
            .iter()
            .filter(|(f, _)| f != START)
            .map(|(f, t)| (f.clone(), NextEntry::Unconditional(t.clone())))
            .collect();
        for (source, router) in self.conditional_edges {
            next_map.insert(source, NextEntry::Conditional(router));
        }

        Ok(CompiledStateGraph::new(
            self.nodes,
            first,
            next_map,
            self.recursion_limit,
        ))
    }
}
