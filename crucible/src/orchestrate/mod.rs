//! Orchestration entry point: context wiring, graph construction, and the
//! run lifecycle.

mod nodes;

pub use nodes::{AgentNode, NodeRole};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use config::EngineConfig;
use event_wire::EventKind;

use crate::agent::{ArchitectAgent, CoderAgent, ExecutorAgent, ReviewerAgent};
use crate::error::AgentError;
use crate::events::EventBus;
use crate::graph::{CompiledStateGraph, StateGraph, END, START};
use crate::inference::{CompletionClient, InferenceFactory};
use crate::state::{HistoryEntry, OrchestrationState};
use crate::tools::{default_registry, ToolRegistry};

/// Everything an agent needs, constructed once at engine startup and threaded
/// explicitly. Tests inject fakes (mock client, empty tool registry) through
/// the same struct.
pub struct EngineContext {
    pub config: EngineConfig,
    pub bus: Arc<EventBus>,
    pub llm: Arc<dyn CompletionClient>,
    pub tools: Arc<ToolRegistry>,
}

impl EngineContext {
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.config.workspace_dir
    }
}

/// Final report of one orchestration run; the HTTP layer returns this as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub task: String,
    pub code: String,
    pub file_path: String,
    pub execution_output: String,
    pub retries: u32,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// Run counters surfaced by the metrics endpoint.
#[derive(Default)]
pub struct EngineStats {
    pub runs_started: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
}

/// The orchestration engine: owns the context and runs tasks through the
/// agent state machine. One engine serves many concurrent runs; each run owns
/// its own state.
pub struct Engine {
    ctx: Arc<EngineContext>,
    stats: EngineStats,
}

impl Engine {
    /// Builds an engine from configuration: event bus, inference factory,
    /// and the default tool registry rooted at the workspace.
    pub fn new(config: EngineConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let llm: Arc<dyn CompletionClient> = Arc::new(InferenceFactory::from_config(&config));
        let tools = Arc::new(default_registry(config.workspace_dir.clone()));
        Self::with_context(Arc::new(EngineContext {
            config,
            bus,
            llm,
            tools,
        }))
    }

    /// Builds an engine over an explicit context (tests inject fakes here).
    pub fn with_context(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            stats: EngineStats::default(),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.ctx.bus
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Compiles the agent state machine:
    /// architect → coder → reviewer → (executor | coder), executor → (END | coder).
    fn build_graph(&self) -> CompiledStateGraph<OrchestrationState> {
        let mut graph = StateGraph::<OrchestrationState>::new();

        graph.add_node(
            ArchitectAgent::NAME,
            Arc::new(AgentNode::new(
                Arc::new(ArchitectAgent::new(self.ctx.clone())),
                NodeRole::Architect,
                self.ctx.clone(),
            )),
        );
        graph.add_node(
            CoderAgent::NAME,
            Arc::new(AgentNode::new(
                Arc::new(CoderAgent::new(self.ctx.clone())),
                NodeRole::Coder,
                self.ctx.clone(),
            )),
        );
        graph.add_node(
            ReviewerAgent::NAME,
            Arc::new(AgentNode::new(
                Arc::new(ReviewerAgent::new(self.ctx.clone())),
                NodeRole::Reviewer,
                self.ctx.clone(),
            )),
        );
        graph.add_node(
            ExecutorAgent::NAME,
            Arc::new(AgentNode::new(
                Arc::new(ExecutorAgent::new(self.ctx.clone())),
                NodeRole::Executor,
                self.ctx.clone(),
            )),
        );

        graph.add_edge(START, ArchitectAgent::NAME);
        graph.add_edge(ArchitectAgent::NAME, CoderAgent::NAME);
        graph.add_edge(CoderAgent::NAME, ReviewerAgent::NAME);
        graph.add_edge(ExecutorAgent::NAME, END);
        graph.add_conditional_edges(
            ReviewerAgent::NAME,
            Arc::new(|state: &OrchestrationState| {
                if state.review_passed || !state.can_retry_review() {
                    ExecutorAgent::NAME.to_string()
                } else {
                    CoderAgent::NAME.to_string()
                }
            }),
            None,
        );

        graph.compile().expect("orchestration graph is well-formed")
    }

    /// Runs one task through the pipeline. Always returns a report; failures
    /// and exhausted retries surface as `success: false` with history, never
    /// as an error.
    pub async fn run(&self, task: impl Into<String>, max_retries: Option<u32>) -> RunReport {
        let task = task.into();
        let run_id = uuid::Uuid::new_v4();
        info!(%run_id, task = %task, "run started");
        self.stats.runs_started.fetch_add(1, Ordering::Relaxed);

        let mut state = OrchestrationState::new(task.clone());
        if let Some(max_retries) = max_retries {
            state.max_retries = max_retries;
        }

        if let Err(e) = std::fs::create_dir_all(&self.ctx.config.workspace_dir) {
            error!(error = %e, "cannot create workspace directory");
        }

        let graph = self.build_graph();
        let report = match graph.invoke(state).await {
            Ok(final_state) => RunReport {
                success: final_state.execution_success,
                task,
                code: final_state.code,
                file_path: final_state.file_path,
                execution_output: final_state.execution_output,
                retries: final_state.error_count,
                history: final_state.history,
                preview_url: final_state.preview_url,
            },
            Err(e) => {
                error!(error = %e, "run terminated abnormally");
                let message = match &e {
                    AgentError::RecursionLimit(limit) => {
                        format!("Run terminated: transition bound of {limit} exceeded")
                    }
                    other => format!("Run terminated: {other}"),
                };
                RunReport {
                    success: false,
                    task,
                    code: String::new(),
                    file_path: String::new(),
                    execution_output: message,
                    retries: 0,
                    history: Vec::new(),
                    preview_url: None,
                }
            }
        };

        if report.success {
            self.stats.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.runs_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.ctx.bus.emit(
            EventKind::Complete,
            "engine",
            json!({
                "run_id": run_id.to_string(),
                "success": report.success,
                "retries": report.retries,
                "history_len": report.history.len(),
            }),
        );
        info!(%run_id, success = report.success, retries = report.retries, "run complete");

        report
    }
}
