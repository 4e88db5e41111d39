//! Executable graph: run nodes from START until END or the transition bound.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::AgentError;

use super::conditional::NextEntry;
use super::node::Node;
use super::state_graph::END;
use super::Next;

/// Compiled, immutable form of a [`StateGraph`](super::StateGraph).
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    recursion_limit: usize,
}

impl<S> Debug for CompiledStateGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStateGraph")
            .field("first_node_id", &self.first_node_id)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
        recursion_limit: usize,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            recursion_limit,
        }
    }

    /// Runs the graph to completion.
    ///
    /// Each node execution counts as one transition; exceeding the recursion
    /// limit terminates the run with [`AgentError::RecursionLimit`].
    pub async fn invoke(&self, state: S) -> Result<S, AgentError> {
        let mut state = state;
        let mut current = self.first_node_id.clone();
        let mut transitions = 0usize;

        loop {
            if transitions >= self.recursion_limit {
                error!(limit = self.recursion_limit, "graph recursion limit exceeded");
                return Err(AgentError::RecursionLimit(self.recursion_limit));
            }
            transitions += 1;

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::ExecutionFailed(format!("unknown node: {current}")))?;
            debug!(node = %current, transitions, "running node");

            let (next_state, next) = node.run(state).await?;
            state = next_state;

            let target = match next {
                Next::End => break,
                Next::Node(id) => id,
                Next::Continue => match self.next_map.get(&current) {
                    Some(NextEntry::Unconditional(to)) => to.clone(),
                    Some(NextEntry::Conditional(router)) => router.resolve(&state),
                    None => {
                        return Err(AgentError::ExecutionFailed(format!(
                            "no outgoing edge from node: {current}"
                        )))
                    }
                },
            };

            if target == END {
                break;
            }
            if !self.nodes.contains_key(&target) {
                return Err(AgentError::ExecutionFailed(format!(
                    "routing to unknown node: {target}"
                )));
            }
            current = target;
        }

        Ok(state)
    }
}
