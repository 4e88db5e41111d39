//! Workspace tools exposed to agents: sandboxed, read-only introspection.
//!
//! Each tool publishes a machine-readable spec (name, description, JSON
//! parameter schema) for LLM function calling and returns a uniform
//! [`ToolResult`]. All paths are contained to the workspace root; escapes are
//! rejected before any filesystem access.

mod grep;
mod path;
mod read_file;

pub use grep::GrepTool;
pub use path::resolve_path_under;
pub use read_file::ReadFileTool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Tool failure, surfaced to the LLM as the `error` field of [`ToolResult`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid regex: {0}")]
    InvalidRegex(String),
    #[error("invalid arguments: {0}")]
    InvalidInput(String),
    #[error("Access denied: path outside workspace")]
    AccessDenied,
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Result of one tool execution, in the shape the agent prompt documents.
#[derive(Clone, Debug, Default)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Machine-readable tool description for function calling.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// OpenAI-compatible function schema.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One tool callable by an agent.
///
/// Implementations must be stateless apart from their workspace root; the
/// registry shares them across calls.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Spec used to build prompts and function schemas.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool with a JSON arguments object.
    async fn call(&self, args: Value) -> ToolResult;
}

/// Registry of tools available to an agent, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// OpenAI function schemas for every registered tool.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.spec().to_schema()).collect()
    }

    /// Executes a tool by name; unknown names fail without panicking.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::failed(format!("Unknown tool: {name}"));
        };
        let result = tool.call(args).await;
        if result.success {
            info!(tool = name, "tool succeeded");
        } else {
            warn!(tool = name, error = ?result.error, "tool failed");
        }
        result
    }
}

/// Registry with the standard workspace tools: grep and read_file.
pub fn default_registry(workspace_root: PathBuf) -> ToolRegistry {
    let root = Arc::new(workspace_root);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GrepTool::new(root.clone())));
    registry.register(Arc::new(ReadFileTool::new(root)));
    registry
}
