//! Architect: turns the task into a structured project plan.
//!
//! May explore the workspace with tools (bounded iterations) before emitting
//! the plan JSON. An unparseable plan falls back to a two-file default rather
//! than failing the run.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{info, warn};

use event_wire::EventKind;

use crate::error::AgentError;
use crate::inference::ChatMessage;
use crate::orchestrate::EngineContext;
use crate::state::{OrchestrationState, Plan};

use super::core::AgentCore;
use super::Agent;

/// Tool-exploration rounds before the plan must be final.
const MAX_TOOL_ITERATIONS: usize = 3;

const SYSTEM_PROMPT: &str = r#"You are an expert software architect and project planner.

Given a coding task, you will:
1. Analyze the requirements
2. Optionally use tools to search/read existing code
3. Design the project as a set of files plus the commands that run it

## Available Tools

You can use tools by outputting a JSON block:
```json
{"tool": "grep", "args": {"pattern": "def function_name", "file_pattern": "*.py"}}
```

**grep** - Search files for patterns
- pattern: Regex pattern to search for
- file_pattern: Optional glob (e.g., "*.py")
- max_results: Max results (default 20)

**read_file** - Read file contents
- path: Path relative to workspace
- start_line: First line (1-indexed)
- end_line: Last line (-1 for end)

After tool results, continue planning.

## Output Format

When ready, output your plan in this EXACT JSON format:
```json
{
    "project_name": "short_name",
    "summary": "Brief description of overall approach",
    "files": [
        {"path": "main.py", "description": "What this file contains"}
    ],
    "execution": {
        "steps": [
            {"cmd": "python main.py", "label": "Run the program", "background": false}
        ],
        "preview_type": "terminal"
    }
}
```

IMPORTANT RULES:
- Output ONLY valid JSON with no extra text when giving the final plan
- Always plan at least 2 files (entry point plus supporting modules)
- Order files so dependencies come before the files that import them
- Steps run in order; mark servers with "background": true and a "port"
- preview_type is one of: terminal, iframe, none"#;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced json regex"));

/// Parses the plan from an LLM response: fenced JSON first, then the first
/// top-level `{...}` span. A document without a `files` key is rejected.
pub(crate) fn parse_plan(response: &str) -> Option<Plan> {
    if let Some(captures) = FENCED_JSON.captures(response) {
        if let Ok(plan) = serde_json::from_str::<Plan>(&captures[1]) {
            return Some(plan);
        }
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Plan>(&response[start..=end]).ok()
}

/// The planning agent; first in the pipeline.
pub struct ArchitectAgent {
    core: AgentCore,
}

impl ArchitectAgent {
    pub const NAME: &'static str = "architect";

    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            core: AgentCore::new(Self::NAME, SYSTEM_PROMPT, ctx),
        }
    }
}

#[async_trait]
impl Agent for ArchitectAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tokens_used(&self) -> u64 {
        self.core.tokens_used()
    }

    async fn invoke(&self, mut state: OrchestrationState) -> Result<OrchestrationState, AgentError> {
        let mut messages = vec![ChatMessage::new(
            "user",
            format!("Create an execution plan for this task:\n\n{}", state.task),
        )];

        let mut response = String::new();
        for _ in 0..MAX_TOOL_ITERATIONS {
            response = self.core.call_llm(&messages, 1024).await?;

            let tool_calls = self.core.parse_tool_calls(&response);
            if tool_calls.is_empty() {
                break;
            }

            let mut tool_context: Vec<String> = Vec::new();
            for call in tool_calls {
                let result = self.core.execute_tool(&call.tool, call.args).await;
                let output = if result.success {
                    result.output
                } else {
                    format!("Error: {}", result.error.unwrap_or_default())
                };
                tool_context.push(format!("Tool: {}\nResult:\n{}", call.tool, output));
            }

            messages.push(ChatMessage::new("assistant", response.clone()));
            messages.push(ChatMessage::new(
                "user",
                format!(
                    "Tool results:\n\n{}\n\nNow continue with your analysis and output the final plan.",
                    tool_context.join("\n\n---\n\n")
                ),
            ));
        }

        let plan = match parse_plan(&response) {
            Some(plan) if !plan.files.is_empty() => plan,
            _ => {
                warn!(agent = Self::NAME, "failed to parse plan, using fallback");
                Plan::fallback(&state.task)
            }
        };

        self.core.ctx().bus.emit(
            EventKind::PlanCreated,
            Self::NAME,
            json!({
                "file_count": plan.files.len(),
                "step_count": plan.execution.steps.len(),
                "project_name": plan.project_name,
            }),
        );

        info!(
            agent = Self::NAME,
            files = plan.files.len(),
            steps = plan.execution.steps.len(),
            "created plan"
        );

        state.add_history(
            Self::NAME,
            "plan",
            format!(
                "Created plan with {} files and {} steps",
                plan.files.len(),
                plan.execution.steps.len()
            ),
        );
        state.add_message(
            "assistant",
            format!("Plan: {}", plan.summary),
            Some(Self::NAME.to_string()),
        );
        state.current_subtask = 0;
        state.current_file_index = 0;
        state.plan = Some(plan);

        Ok(state)
    }
}
