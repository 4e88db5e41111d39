//! Agent execution error types.
//!
//! Used by `Agent::invoke`, `Node::run`, and the graph runner. Classification
//! into `{category, recovery_strategy}` happens separately in [`crate::classify`];
//! this type is what propagates through `?`.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::tools::ToolError;

/// Agent execution error.
///
/// Returned by `Agent::invoke` when a step fails. The graph runner converts
/// these into crash-bypass mutations; the engine converts any terminal error
/// into a `success=false` run report.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Execution failed with a message (bad plan, unwritable workspace, ...).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The inference backend failed past all client-side recovery.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    /// A workspace tool failed.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// The LLM response could not be parsed into the expected shape, even
    /// after format-fix retries.
    #[error("parse error: {0}")]
    Parse(String),

    /// The graph exceeded its transition bound; the run is terminated.
    #[error("recursion limit of {0} transitions exceeded")]
    RecursionLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of ExecutionFailed contains the message.
    #[test]
    fn display_execution_failed() {
        let err = AgentError::ExecutionFailed("no plan".to_string());
        let s = err.to_string();
        assert!(s.contains("execution failed"), "{s}");
        assert!(s.contains("no plan"), "{s}");
    }

    /// **Scenario**: RecursionLimit names the bound.
    #[test]
    fn display_recursion_limit() {
        let s = AgentError::RecursionLimit(50).to_string();
        assert!(s.contains("50"), "{s}");
    }
}
