//! Routing decision returned by a node alongside its updated state.

/// Where execution goes after a node finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Follow the graph's edges (unconditional or conditional) from this node.
    Continue,
    /// Jump straight to the named node.
    Node(String),
    /// Stop the run.
    End,
}
