//! Executor: runs the plan's steps inside the workspace.
//!
//! Foreground steps run under `sh -c` with a wall-clock timeout; background
//! steps get a two-second liveness window and, with a port, a preview URL.
//! The first failing step stops the plan. The legacy single-file path keeps
//! the original interpreter whitelist and workspace containment check.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{error, info, warn};

use event_wire::EventKind;

use crate::error::AgentError;
use crate::events::truncate;
use crate::orchestrate::EngineContext;
use crate::state::{ExecutionStep, OrchestrationState};

use super::Agent;

/// Interpreters the legacy single-file path may spawn.
const COMMAND_WHITELIST: [&str; 4] = ["python", "python3", "pytest", "ruff"];

/// Liveness window for background steps.
const BACKGROUND_STARTUP: Duration = Duration::from_secs(2);

/// The execution agent; last in the pipeline.
pub struct ExecutorAgent {
    ctx: Arc<EngineContext>,
}

impl ExecutorAgent {
    pub const NAME: &'static str = "executor";

    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn shell_command(&self, cmd: &str) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.ctx.config.workspace_dir)
            .env("PYTHONUNBUFFERED", "1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Runs one foreground command to completion, bounded by the execution
    /// timeout. Returns `(success, combined output)`.
    async fn run_command(&self, cmd: &str) -> (bool, String) {
        let timeout = self.ctx.config.execution_timeout;
        let child = match self.shell_command(cmd).spawn() {
            Ok(child) => child,
            Err(e) => return (false, format!("Error: {e}")),
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    combined.push_str("\n--- STDERR ---\n");
                    combined.push_str(&stderr);
                }
                (output.status.success(), combined.trim().to_string())
            }
            Ok(Err(e)) => (false, format!("Error: {e}")),
            Err(_) => (
                false,
                format!("Command timed out after {}s", timeout.as_secs_f64()),
            ),
        }
    }

    /// Starts a background process, waits the liveness window, and reports
    /// `(success, output, port)`.
    async fn run_background(&self, cmd: &str, port: Option<u16>) -> (bool, String, Option<u16>) {
        let mut child = match self.shell_command(cmd).spawn() {
            Ok(child) => child,
            Err(e) => return (false, format!("Error: {e}"), None),
        };

        tokio::time::sleep(BACKGROUND_STARTUP).await;

        match child.try_wait() {
            Ok(Some(_status)) => {
                let output = match child.wait_with_output().await {
                    Ok(out) => format!(
                        "{}\n{}",
                        String::from_utf8_lossy(&out.stdout),
                        String::from_utf8_lossy(&out.stderr)
                    ),
                    Err(e) => e.to_string(),
                };
                (false, format!("Process exited immediately:\n{output}"), None)
            }
            Ok(None) => {
                let pid = child.id().unwrap_or_default();
                // Hand the child to a reaper task so the server keeps running
                // and does not become a zombie when it eventually exits.
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                (true, format!("Started background process (PID: {pid})"), port)
            }
            Err(e) => (false, format!("Error: {e}"), None),
        }
    }

    async fn run_plan_steps(
        &self,
        state: &mut OrchestrationState,
        steps: Vec<ExecutionStep>,
    ) -> (bool, String) {
        let mut all_output: Vec<String> = Vec::new();
        let mut overall_success = true;

        for (i, step) in steps.iter().enumerate() {
            let label = step.display_label().to_string();
            info!(agent = Self::NAME, step = i + 1, %label, "running step");
            self.ctx.bus.emit(
                EventKind::ExecutionStep,
                Self::NAME,
                json!({ "step": i + 1, "label": label, "cmd": step.cmd, "status": "running" }),
            );

            let (success, output) = if step.background {
                let (success, output, port) = self.run_background(&step.cmd, step.port).await;
                if success {
                    if let Some(port) = port {
                        state.preview_url = Some(format!("http://localhost:{port}"));
                    }
                }
                (success, output)
            } else {
                self.run_command(&step.cmd).await
            };

            all_output.push(format!("=== {label} ===\n{output}"));
            self.ctx.bus.emit(
                EventKind::ExecutionStep,
                Self::NAME,
                json!({
                    "step": i + 1,
                    "label": label,
                    "status": if success { "success" } else { "failed" },
                    "output": truncate(&output, 500),
                }),
            );

            if !success {
                error!(agent = Self::NAME, step = i + 1, %label, "step failed");
                overall_success = false;
                break;
            }
        }

        (overall_success, all_output.join("\n\n"))
    }

    /// Legacy single-file path: containment check plus interpreter whitelist.
    async fn fallback_execution(&self, state: &mut OrchestrationState) -> (bool, String) {
        let workspace = &self.ctx.config.workspace_dir;
        let candidate: Option<PathBuf> = if workspace.join("main.py").is_file() {
            Some(workspace.join("main.py"))
        } else if !state.file_path.is_empty() {
            Some(PathBuf::from(&state.file_path))
        } else {
            first_python_file(workspace)
        };

        let Some(file) = candidate else {
            return (false, "No executable files found".to_string());
        };

        if let Err(msg) = check_containment(workspace, &file) {
            return (false, msg);
        }
        let cmd = format!("python {}", file.display());
        if let Err(msg) = check_whitelist(&cmd) {
            return (false, msg);
        }
        state.add_history(Self::NAME, "execute", format!("Fallback execution: {cmd}"));
        self.run_command(&cmd).await
    }
}

fn first_python_file(workspace: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(workspace)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "py").unwrap_or(false))
        .collect();
    entries.sort();
    entries.into_iter().next()
}

/// Rejects any file path that resolves outside the workspace root.
fn check_containment(workspace: &Path, file: &Path) -> Result<(), String> {
    let workspace = workspace
        .canonicalize()
        .map_err(|e| format!("Error: workspace unavailable: {e}"))?;
    let resolved = file
        .canonicalize()
        .map_err(|e| format!("Error: {}: {e}", file.display()))?;
    if resolved.starts_with(&workspace) {
        Ok(())
    } else {
        Err(format!(
            "Security error: {} is outside the workspace",
            file.display()
        ))
    }
}

/// Only whitelisted interpreters may run on the legacy path.
fn check_whitelist(cmd: &str) -> Result<(), String> {
    let argv0 = cmd.split_whitespace().next().unwrap_or_default();
    let program = Path::new(argv0)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(argv0);
    if COMMAND_WHITELIST.contains(&program) {
        Ok(())
    } else {
        Err(format!("Security error: command not allowed: {program}"))
    }
}

#[async_trait]
impl Agent for ExecutorAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, mut state: OrchestrationState) -> Result<OrchestrationState, AgentError> {
        let steps: Vec<ExecutionStep> = state
            .plan
            .as_ref()
            .map(|p| p.execution.steps.clone())
            .unwrap_or_default();

        let (success, output) = if steps.is_empty() {
            let result = self.fallback_execution(&mut state).await;
            if state
                .history
                .last()
                .map(|h| h.action != "execute")
                .unwrap_or(true)
            {
                state.add_history(Self::NAME, "execute", format!("success={}", result.0));
            }
            result
        } else {
            let step_count = steps.len();
            let result = self.run_plan_steps(&mut state, steps).await;
            if let Some(url) = state
                .plan
                .as_ref()
                .and_then(|p| p.execution.preview_url.clone())
            {
                state.preview_url = Some(url);
            }
            state.add_history(
                Self::NAME,
                "execute",
                format!("Ran {} steps, success={}", step_count, result.0),
            );
            result
        };

        state.execution_output = output;
        state.execution_success = success;

        self.ctx.bus.emit_execution(
            Self::NAME,
            success,
            truncate(&state.execution_output, 1000),
            if success { 0 } else { 1 },
        );

        if success {
            info!(agent = Self::NAME, "execution succeeded");
        } else {
            warn!(agent = Self::NAME, "execution failed");
        }

        Ok(state)
    }
}
