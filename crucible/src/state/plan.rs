//! Plan types produced by the Architect: project files plus execution steps.
//!
//! The serde shapes here are exactly what the Architect prompt demands, so a
//! fenced JSON block parses straight into [`Plan`]. Fields the model may omit
//! (`background`, `port`, `requires_approval`, `preview_url`) carry defaults.

use serde::{Deserialize, Serialize};

/// How the dashboard should preview the result of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewType {
    #[default]
    Terminal,
    Iframe,
    None,
}

/// One file the Architect planned. `generated` and `content` move together:
/// a spec is generated exactly when its content is non-empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileSpec {
    /// Workspace-relative path.
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub generated: bool,
}

impl FileSpec {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            content: String::new(),
            generated: false,
        }
    }

    /// Records generated content, keeping the `generated ⇔ content ≠ ""`
    /// invariant.
    pub fn mark_generated(&mut self, content: String) {
        self.generated = !content.is_empty();
        self.content = content;
    }
}

/// One step of the execution plan.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub cmd: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub port: Option<u16>,
    /// Reserved for hardened deployments; not enforced by the engine.
    #[serde(default)]
    pub requires_approval: bool,
}

impl ExecutionStep {
    pub fn foreground(cmd: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Display label: the explicit label, or the command itself.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.cmd
        } else {
            &self.label
        }
    }
}

/// Ordered execution steps plus preview wiring.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub preview_type: PreviewType,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// Structured output of the Architect.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub summary: String,
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub execution: ExecutionPlan,
}

impl Plan {
    /// The minimal fallback used when the Architect output cannot be parsed
    /// or the Architect crashes: the whole task as one main file plus a
    /// utilities sibling, run directly.
    pub fn fallback(task: &str) -> Self {
        Plan {
            project_name: "generated".to_string(),
            summary: task.to_string(),
            files: vec![
                FileSpec::new("main.py", task),
                FileSpec::new("utils.py", "Helper functions for the task"),
            ],
            execution: ExecutionPlan {
                steps: vec![ExecutionStep::foreground("python main.py", "Run")],
                preview_type: PreviewType::Terminal,
                preview_url: None,
            },
        }
    }

    /// A single-subtask plan injected by the crash bypass: one file, no steps,
    /// so the legacy single-file paths take over downstream.
    pub fn minimal(task: &str) -> Self {
        Plan {
            project_name: "generated".to_string(),
            summary: task.to_string(),
            files: vec![FileSpec::new("main.py", task)],
            execution: ExecutionPlan::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: an Architect-shaped JSON document parses into a Plan
    /// with defaults for omitted step fields.
    #[test]
    fn plan_parses_architect_json() {
        let raw = r#"{
            "project_name": "hello",
            "summary": "Print hello world",
            "files": [
                {"path": "main.py", "description": "entry point"},
                {"path": "utils.py", "description": "helpers"}
            ],
            "execution": {
                "steps": [
                    {"cmd": "python main.py", "label": "Run"},
                    {"cmd": "python -m http.server", "label": "Serve", "background": true, "port": 8000}
                ],
                "preview_type": "terminal"
            }
        }"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.files.len(), 2);
        assert!(!plan.files[0].generated);
        assert_eq!(plan.execution.steps.len(), 2);
        assert!(!plan.execution.steps[0].background);
        assert_eq!(plan.execution.steps[1].port, Some(8000));
        assert!(!plan.execution.steps[0].requires_approval);
        assert_eq!(plan.execution.preview_type, PreviewType::Terminal);
        assert!(plan.execution.preview_url.is_none());
    }

    /// **Scenario**: a plan without a `files` key is rejected.
    #[test]
    fn plan_requires_files_key() {
        let raw = r#"{"summary": "no files here"}"#;
        assert!(serde_json::from_str::<Plan>(raw).is_err());
    }

    /// **Scenario**: mark_generated keeps generated ⇔ non-empty content.
    #[test]
    fn mark_generated_tracks_content() {
        let mut spec = FileSpec::new("a.py", "a");
        spec.mark_generated("print(1)".to_string());
        assert!(spec.generated);
        spec.mark_generated(String::new());
        assert!(!spec.generated);
    }

    /// **Scenario**: the fallback plan has two files and a run step; the
    /// minimal bypass plan has one file and no steps.
    #[test]
    fn fallback_and_minimal_shapes() {
        let fb = Plan::fallback("Sort a list");
        assert_eq!(fb.files.len(), 2);
        assert_eq!(fb.execution.steps.len(), 1);

        let min = Plan::minimal("Sort a list");
        assert_eq!(min.files.len(), 1);
        assert!(min.execution.steps.is_empty());
    }

    /// **Scenario**: display label falls back to the command.
    #[test]
    fn step_display_label() {
        let mut step = ExecutionStep::foreground("echo hi", "Say hi");
        assert_eq!(step.display_label(), "Say hi");
        step.label.clear();
        assert_eq!(step.display_label(), "echo hi");
    }
}
