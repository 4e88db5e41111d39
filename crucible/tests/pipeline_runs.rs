//! End-to-end pipeline scenarios driven by scripted mock responses.
//!
//! Execution steps use `sh`/`echo` so the suite has no interpreter
//! dependencies beyond a POSIX shell.

use std::sync::Arc;

use async_trait::async_trait;

use config::EngineConfig;
use crucible::{
    CompletionClient, CompletionRequest, CompletionResponse, Engine, EngineContext, EventBus,
    InferenceError, MockLlm, ToolRegistry,
};

fn engine_with(llm: Arc<dyn CompletionClient>, workspace: &std::path::Path) -> Engine {
    let mut config = EngineConfig::default();
    config.workspace_dir = workspace.to_path_buf();
    config.execution_timeout = std::time::Duration::from_secs(10);
    Engine::with_context(Arc::new(EngineContext {
        config,
        bus: Arc::new(EventBus::new()),
        llm,
        tools: Arc::new(ToolRegistry::new()),
    }))
}

fn plan_json(files: &[(&str, &str)], cmd: &str) -> String {
    let files: Vec<String> = files
        .iter()
        .map(|(path, desc)| format!(r#"{{"path": "{path}", "description": "{desc}"}}"#))
        .collect();
    format!(
        r#"```json
{{
  "project_name": "scenario",
  "summary": "scripted scenario",
  "files": [{}],
  "execution": {{
    "steps": [{{"cmd": "{}", "label": "Run"}}],
    "preview_type": "terminal"
  }}
}}
```"#,
        files.join(", "),
        cmd
    )
}

fn python_block(body: &str) -> String {
    format!("```python\n{body}\n```")
}

/// Happy path: two files, review passes, the step exits zero. One history
/// entry per agent, no retries.
#[tokio::test]
async fn happy_path_two_files() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlm::with_responses(vec![
        plan_json(
            &[("main.py", "entry point"), ("utils.py", "helpers")],
            "echo hello world",
        ),
        python_block("from utils import greet\n\nprint(greet())"),
        python_block("def greet():\n    return \"hello world\""),
    ]));
    let engine = engine_with(llm, dir.path());
    let (_id, mut rx) = engine.bus().subscribe(1024);

    let report = engine.run("Print hello world", None).await;

    assert!(report.success, "output: {}", report.execution_output);
    assert_eq!(report.retries, 0);
    assert!(report.execution_output.contains("hello world"));

    // Exactly one history entry per agent.
    let agents: Vec<&str> = report.history.iter().map(|h| h.agent.as_str()).collect();
    assert_eq!(agents, vec!["architect", "coder", "reviewer", "executor"]);

    // Files landed in the workspace.
    assert!(dir.path().join("main.py").is_file());
    assert!(dir.path().join("utils.py").is_file());

    // Every event conforms to the envelope; the stream ends with complete.
    let mut kinds: Vec<String> = Vec::new();
    while let Ok(line) = rx.try_recv() {
        let v: serde_json::Value = serde_json::from_str(&line).expect("valid event JSON");
        assert!(v["type"].is_string());
        assert!(v["agent"].is_string());
        assert!(v["data"].is_object());
        assert!(v["timestamp"].as_f64().unwrap() > 0.0);
        kinds.push(v["type"].as_str().unwrap().to_string());
    }
    assert!(kinds.contains(&"plan_created".to_string()));
    assert!(kinds.contains(&"file_created".to_string()));
    assert!(kinds.contains(&"token".to_string()));
    assert!(kinds.contains(&"code_reviewed".to_string()));
    assert!(kinds.contains(&"execution_step".to_string()));
    assert_eq!(kinds.last().map(String::as_str), Some("complete"));
}

/// Review→Coder loop: the first generation trips the dangerous-pattern scan,
/// the regeneration passes, and the run succeeds with two review rounds.
#[tokio::test]
async fn review_failure_loops_to_coder() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlm::with_responses(vec![
        plan_json(&[("main.py", "entry point")], "echo ok"),
        python_block("result = eval(input())\nprint(result)"),
        python_block("value = int(input())\nprint(value)"),
    ]));
    let engine = engine_with(llm, dir.path());

    let report = engine.run("Read a number and print it", None).await;

    assert!(report.success, "output: {}", report.execution_output);
    assert_eq!(report.retries, 0);

    let reviewer_results: Vec<&str> = report
        .history
        .iter()
        .filter(|h| h.agent == "reviewer")
        .map(|h| h.result.as_str())
        .collect();
    assert_eq!(reviewer_results.len(), 2, "two review rounds");
    assert!(reviewer_results[0].starts_with("failed"));
    assert_eq!(reviewer_results[1], "passed");

    // The regenerated file no longer contains the dangerous call.
    let content = std::fs::read_to_string(dir.path().join("main.py")).unwrap();
    assert!(!content.contains("eval("));
}

/// Executor→Coder loop: the first generation fails at runtime, the
/// regeneration fixes it, and the run succeeds after one retry.
#[tokio::test]
async fn execution_failure_loops_to_coder() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlm::with_responses(vec![
        plan_json(&[("run.sh", "shell entry point")], "sh run.sh"),
        "```\necho broken >&2\nexit 3\n```".to_string(),
        "```\necho fixed\n```".to_string(),
    ]));
    let engine = engine_with(llm, dir.path());

    let report = engine.run("Print fixed", None).await;

    assert!(report.success, "output: {}", report.execution_output);
    assert_eq!(report.retries, 1);
    assert!(report.execution_output.contains("fixed"));
}

/// Retry exhaustion terminates cleanly: success=false, populated history,
/// retries at the cap.
#[tokio::test]
async fn retry_exhaustion_terminates_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlm::with_responses(vec![
        plan_json(&[("run.sh", "always fails")], "sh run.sh"),
        "```\nexit 7\n```".to_string(),
    ]));
    let engine = engine_with(llm, dir.path());

    let report = engine.run("Fail forever", Some(2)).await;

    assert!(!report.success);
    assert_eq!(report.retries, 2);
    assert!(!report.history.is_empty());
    let executor_runs = report
        .history
        .iter()
        .filter(|h| h.agent == "executor" && h.action == "execute")
        .count();
    assert_eq!(executor_runs, 3, "initial attempt plus two retries");
}

/// A completion client whose first call fails hard, then delegates.
struct FirstCallFails {
    inner: MockLlm,
    failed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl CompletionClient for FirstCallFails {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(InferenceError::Status {
                code: 500,
                body: "model exploded".to_string(),
            });
        }
        self.inner.complete(request).await
    }
}

/// Architect crash bypass: the failing architect is replaced by a minimal
/// one-file plan, the run completes, and history records the bypass.
#[tokio::test]
async fn architect_crash_is_bypassed() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FirstCallFails {
        inner: MockLlm::new(python_block("print(\"hello\")")),
        failed: std::sync::atomic::AtomicBool::new(false),
    });
    let engine = engine_with(llm, dir.path());

    let report = engine.run("Print hello", Some(0)).await;

    assert!(report
        .history
        .iter()
        .any(|h| h.agent == "architect" && h.action == "bypass"));
    // The bypass plan carries exactly one file, which the coder generated.
    assert!(dir.path().join("main.py").is_file());
}
