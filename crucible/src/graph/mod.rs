//! State graph: nodes + explicit edges, conditional routing, bounded invoke.
//!
//! Build with `add_node` / `add_edge(START, ...)` / `add_conditional_edges`,
//! then `compile()` to get an executable [`CompiledStateGraph`]. Nodes may
//! also route directly by returning [`Next::Node`] or [`Next::End`].

mod compile_error;
mod compiled;
mod conditional;
mod next;
mod node;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::CompiledStateGraph;
pub use conditional::{ConditionalRouter, RouterFn};
pub use next::Next;
pub use node::Node;
pub use state_graph::{StateGraph, END, START};
