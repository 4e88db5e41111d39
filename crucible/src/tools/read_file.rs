//! Read-file tool: numbered file contents with optional line ranges, contained
//! to the workspace root.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::path::resolve_path_under;
use super::{Tool, ToolError, ToolResult, ToolSpec};

/// Tool name for reading a workspace file.
pub const TOOL_READ_FILE: &str = "read_file";

/// Reads file contents from the workspace, `{:4} | ` numbered.
pub struct ReadFileTool {
    workspace_root: Arc<std::path::PathBuf>,
}

impl ReadFileTool {
    pub fn new(workspace_root: Arc<std::path::PathBuf>) -> Self {
        Self { workspace_root }
    }

    fn run(&self, path: &str, start_line: i64, end_line: i64) -> Result<String, ToolError> {
        let resolved = resolve_path_under(self.workspace_root.as_ref(), path)?;
        if !resolved.exists() {
            return Err(ToolError::NotFound(path.to_string()));
        }
        if !resolved.is_file() {
            return Err(ToolError::NotAFile(path.to_string()));
        }

        let content =
            std::fs::read_to_string(&resolved).map_err(|e| ToolError::Io(e.to_string()))?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let start_idx = (start_line.max(1) as usize - 1).min(total);
        let end_idx = if end_line < 0 {
            total
        } else {
            (end_line as usize).min(total)
        };
        let end_idx = end_idx.max(start_idx);

        let mut out = format!("File: {} (lines {}-{} of {})\n", path, start_idx + 1, end_idx, total);
        let numbered: Vec<String> = lines[start_idx..end_idx]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:4} | {}", start_idx + i + 1, line.trim_end()))
            .collect();
        out.push_str(&numbered.join("\n"));
        Ok(out)
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_READ_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_READ_FILE.to_string(),
            description: "Read the contents of a file in the workspace. \
                 Can optionally read only specific line ranges. \
                 Use this to examine code or configuration files."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to file relative to workspace root"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to read (1-indexed, inclusive)",
                        "default": 1
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to read (1-indexed, inclusive). -1 for end of file.",
                        "default": -1
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: Value) -> ToolResult {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return ToolResult::failed(ToolError::InvalidInput("path is required".to_string()));
        };
        let start_line = args.get("start_line").and_then(Value::as_i64).unwrap_or(1);
        let end_line = args.get("end_line").and_then(Value::as_i64).unwrap_or(-1);

        match self.run(path, start_line, end_line) {
            Ok(output) => ToolResult::ok(output),
            Err(e) => ToolResult::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, ReadFileTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("code.py"), "line one\nline two\nline three\n").unwrap();
        let tool = ReadFileTool::new(Arc::new(dir.path().to_path_buf()));
        (dir, tool)
    }

    /// **Scenario**: whole-file read is numbered with a header.
    #[tokio::test]
    async fn read_whole_file() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"path": "code.py"})).await;
        assert!(result.success);
        assert!(result.output.starts_with("File: code.py (lines 1-3 of 3)"));
        assert!(result.output.contains("   1 | line one"));
        assert!(result.output.contains("   3 | line three"));
    }

    /// **Scenario**: start/end bounds select an inclusive 1-indexed range;
    /// -1 means EOF.
    #[tokio::test]
    async fn read_line_range() {
        let (_dir, tool) = workspace();
        let result = tool
            .call(json!({"path": "code.py", "start_line": 2, "end_line": 2}))
            .await;
        assert!(result.success);
        assert!(result.output.contains("lines 2-2 of 3"));
        assert!(result.output.contains("   2 | line two"));
        assert!(!result.output.contains("line one"));

        let tail = tool.call(json!({"path": "code.py", "start_line": 2})).await;
        assert!(tail.output.contains("line three"));
    }

    /// **Scenario**: escaping the workspace fails with `Access denied`.
    #[tokio::test]
    async fn read_escape_denied() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"path": "../../etc/passwd"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Access denied"));
    }

    /// **Scenario**: a missing file fails with `File not found`.
    #[tokio::test]
    async fn read_missing_file() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"path": "ghost.py"})).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap(), "File not found: ghost.py");
    }
}
