//! Graph node trait: one step in a [`StateGraph`](super::StateGraph).

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::AgentError;

use super::Next;

/// One step in a graph: state in, (state out, routing) out.
///
/// Return [`Next::Continue`] to follow the graph's edges, [`Next::Node`] to
/// jump, [`Next::End`] to stop. Nodes must be shareable; per-run data lives
/// in the state, never in the node.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id, unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S) -> Result<(S, Next), AgentError>;
}
