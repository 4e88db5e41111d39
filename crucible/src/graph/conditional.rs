//! Conditional edges: route from a source node based on the updated state.

use std::collections::HashMap;
use std::sync::Arc;

/// Routing function: reads the state after the source node ran and returns a
/// key (a node id, or a key into the path map, or END).
pub type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Router plus optional key → node-id map.
pub struct ConditionalRouter<S> {
    pub path: RouterFn<S>,
    pub path_map: Option<HashMap<String, String>>,
}

impl<S> Clone for ConditionalRouter<S> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            path_map: self.path_map.clone(),
        }
    }
}

impl<S> ConditionalRouter<S> {
    pub fn new(path: RouterFn<S>, path_map: Option<HashMap<String, String>>) -> Self {
        Self { path, path_map }
    }

    /// Resolves the next node id for the given state: the router's key,
    /// mapped through `path_map` when present (unmapped keys pass through).
    pub fn resolve(&self, state: &S) -> String {
        let key = (self.path)(state);
        match &self.path_map {
            Some(map) => map.get(&key).cloned().unwrap_or(key),
            None => key,
        }
    }
}

/// Outgoing routing for one node inside a compiled graph.
pub(crate) enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}
