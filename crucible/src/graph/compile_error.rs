//! Graph validation errors raised by `compile()`.

use thiserror::Error;

/// Why a [`StateGraph`](super::StateGraph) failed to compile.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An edge references a node id that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge out of START.
    #[error("missing edge from START")]
    MissingStart,

    /// More than one edge out of START.
    #[error("multiple edges from START")]
    AmbiguousStart,

    /// No path reaches END.
    #[error("no edge or conditional path reaches END")]
    MissingEnd,

    /// A node has two unconditional outgoing edges.
    #[error("duplicate outgoing edge from node: {0}")]
    DuplicateEdge(String),

    /// A node has both an unconditional edge and conditional edges.
    #[error("node has both an edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// A conditional path map points at an unknown node.
    #[error("conditional path target not found: {0}")]
    InvalidConditionalTarget(String),
}
