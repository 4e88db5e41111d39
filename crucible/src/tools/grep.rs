//! Grep tool: case-insensitive regex search over workspace file contents.
//!
//! Walks the workspace with [`walkdir`], filters filenames with
//! [`glob::Pattern`], skips VCS/cache directories and binary extensions, and
//! emits `relpath:lineno: line` entries up to `max_results`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{Tool, ToolError, ToolResult, ToolSpec};

/// Tool name for workspace content search.
pub const TOOL_GREP: &str = "grep";

const DEFAULT_MAX_RESULTS: usize = 20;

const SKIP_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", ".venv", "venv"];
const SKIP_EXTS: &[&str] = &["pyc", "pyo", "so", "dll", "exe", "bin", "jpg", "png"];

/// Searches file contents under the workspace root.
pub struct GrepTool {
    workspace_root: Arc<std::path::PathBuf>,
}

impl GrepTool {
    pub fn new(workspace_root: Arc<std::path::PathBuf>) -> Self {
        Self { workspace_root }
    }

    fn should_skip(path: &Path) -> bool {
        for comp in path.components() {
            if let std::path::Component::Normal(name) = comp {
                if SKIP_DIRS.iter().any(|d| name == std::ffi::OsStr::new(d)) {
                    return true;
                }
            }
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SKIP_EXTS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn run(&self, pattern: &str, file_pattern: &str, max_results: usize) -> Result<String, ToolError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ToolError::InvalidRegex(e.to_string()))?;

        let file_glob = Pattern::new(file_pattern)
            .map_err(|e| ToolError::InvalidInput(format!("invalid file pattern: {e}")))?;

        if !self.workspace_root.is_dir() {
            return Err(ToolError::Io(format!(
                "Workspace directory does not exist: {}",
                self.workspace_root.display()
            )));
        }

        let mut matches: Vec<String> = Vec::new();
        'walk: for entry in WalkDir::new(self.workspace_root.as_ref()).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(self.workspace_root.as_ref())
                .unwrap_or(path);
            if Self::should_skip(rel) {
                continue;
            }
            let fname = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            if !file_glob.matches(&fname) {
                continue;
            }

            let bytes = match std::fs::read(path) {
                Ok(b) => b,
                Err(_) => continue,
            };
            if bytes.contains(&0u8) {
                continue;
            }
            let content = String::from_utf8_lossy(&bytes);
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}: {}", rel.display(), idx + 1, line.trim_end()));
                    if matches.len() >= max_results {
                        break 'walk;
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!("No matches found for pattern: {pattern}"));
        }
        Ok(format!("Found {} matches:\n{}", matches.len(), matches.join("\n")))
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        TOOL_GREP
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GREP.to_string(),
            description: "Search for a pattern in files within the workspace. \
                 Returns matching lines with file paths and line numbers. \
                 Use this to find code, functions, or specific text patterns."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for"
                    },
                    "file_pattern": {
                        "type": "string",
                        "description": "Optional glob pattern to filter files (e.g., '*.py')",
                        "default": "*"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "default": 20
                    }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn call(&self, args: Value) -> ToolResult {
        let Some(pattern) = args.get("pattern").and_then(Value::as_str) else {
            return ToolResult::failed(ToolError::InvalidInput("pattern is required".to_string()));
        };
        let file_pattern = args
            .get("file_pattern")
            .and_then(Value::as_str)
            .unwrap_or("*");
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .max(1);

        match self.run(pattern, file_pattern, max_results) {
            Ok(output) => ToolResult::ok(output),
            Err(e) => ToolResult::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, GrepTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "def main():\n    print('hello')\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "DEF in caps\n").unwrap();
        std::fs::create_dir(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/main.pyc"), "def cached").unwrap();
        let tool = GrepTool::new(Arc::new(dir.path().to_path_buf()));
        (dir, tool)
    }

    /// **Scenario**: matches are case-insensitive, prefixed with
    /// `relpath:lineno:`, and skip cache directories.
    #[tokio::test]
    async fn grep_finds_matches_case_insensitive() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"pattern": "def"})).await;
        assert!(result.success);
        assert!(result.output.starts_with("Found 2 matches:"), "{}", result.output);
        assert!(result.output.contains("main.py:1: def main():"));
        assert!(result.output.contains("notes.txt:1: DEF in caps"));
        assert!(!result.output.contains("pyc"));
    }

    /// **Scenario**: file_pattern narrows the search by filename glob.
    #[tokio::test]
    async fn grep_honors_file_pattern() {
        let (_dir, tool) = workspace();
        let result = tool
            .call(json!({"pattern": "def", "file_pattern": "*.py"}))
            .await;
        assert!(result.success);
        assert!(result.output.contains("main.py"));
        assert!(!result.output.contains("notes.txt"));
    }

    /// **Scenario**: max_results caps the output.
    #[tokio::test]
    async fn grep_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        let many: String = (0..50).map(|i| format!("item {i}\n")).collect();
        std::fs::write(dir.path().join("data.txt"), many).unwrap();
        let tool = GrepTool::new(Arc::new(dir.path().to_path_buf()));
        let result = tool.call(json!({"pattern": "item", "max_results": 5})).await;
        assert!(result.success);
        assert!(result.output.starts_with("Found 5 matches:"));
    }

    /// **Scenario**: an invalid regex fails with `Invalid regex`.
    #[tokio::test]
    async fn grep_invalid_regex() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"pattern": "[unclosed"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Invalid regex"));
    }

    /// **Scenario**: no match yields the "No matches" message, still success.
    #[tokio::test]
    async fn grep_no_matches() {
        let (_dir, tool) = workspace();
        let result = tool.call(json!({"pattern": "zebra_unicorn"})).await;
        assert!(result.success);
        assert_eq!(result.output, "No matches found for pattern: zebra_unicorn");
    }
}
