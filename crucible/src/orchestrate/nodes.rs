//! Graph nodes around the agents: telemetry, crash bypass, and routing.
//!
//! A crashing agent never aborts the run. The wrapper injects a neutral
//! state mutation appropriate to the role, records a `bypass` history entry,
//! and lets the machine continue. The executor node also owns the retry
//! bookkeeping for the execution→coder loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use event_wire::EventKind;

use crate::agent::{run_with_telemetry, Agent, CoderAgent};
use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::state::{OrchestrationState, Plan};

use super::EngineContext;

/// Which pipeline position a node fills; decides both bypass mutation and
/// routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Architect,
    Coder,
    Reviewer,
    Executor,
}

/// Node wrapper pairing an agent with its role.
pub struct AgentNode {
    agent: Arc<dyn Agent>,
    role: NodeRole,
    ctx: Arc<EngineContext>,
}

impl AgentNode {
    pub fn new(agent: Arc<dyn Agent>, role: NodeRole, ctx: Arc<EngineContext>) -> Self {
        Self { agent, role, ctx }
    }

    /// Neutral mutation applied when the wrapped agent crashes.
    fn bypass(&self, mut state: OrchestrationState, error: &AgentError) -> OrchestrationState {
        warn!(agent = self.agent.name(), error = %error, "agent crashed, bypassing");
        match self.role {
            NodeRole::Architect => {
                state.plan = Some(Plan::minimal(&state.task));
                state.current_subtask = 0;
                state.current_file_index = 0;
            }
            NodeRole::Reviewer => {
                state.review_passed = true;
                state.review_feedback = format!("Review skipped: {error}");
            }
            NodeRole::Coder | NodeRole::Executor => {
                state.execution_success = false;
                state.execution_output = format!("{} crashed: {error}", self.agent.name());
            }
        }
        state.add_history(self.agent.name(), "bypass", format!("crash: {error}"));
        state
    }

    /// Routing after the executor (normal or bypassed): end on success or
    /// exhausted retries; otherwise prepare the retry loop and jump to the
    /// coder.
    fn route_after_execution(&self, state: &mut OrchestrationState) -> Next {
        if state.execution_success {
            return Next::End;
        }
        if !state.can_retry() {
            return Next::End;
        }
        state.error_count += 1;
        state.review_attempts = 0;
        state.review_passed = false;
        self.ctx.bus.emit(
            EventKind::Retry,
            self.agent.name(),
            json!({ "attempt": state.error_count, "max_retries": state.max_retries }),
        );
        Next::Node(CoderAgent::NAME.to_string())
    }
}

#[async_trait]
impl Node<OrchestrationState> for AgentNode {
    fn id(&self) -> &str {
        self.agent.name()
    }

    async fn run(
        &self,
        state: OrchestrationState,
    ) -> Result<(OrchestrationState, Next), AgentError> {
        let snapshot = state.clone();
        let mut state = match run_with_telemetry(self.agent.as_ref(), state, &self.ctx.bus).await {
            Ok(updated) => updated,
            Err(e) => self.bypass(snapshot, &e),
        };

        if state.should_compress_context() {
            state.compress_context(crate::state::COMPRESS_KEEP_RECENT);
        }

        let next = match self.role {
            NodeRole::Executor => self.route_after_execution(&mut state),
            // Coder bypass marks execution failed; the reviewer still runs
            // next and its "No code to review" verdict drives the repair loop.
            _ => Next::Continue,
        };

        Ok((state, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::inference::MockLlm;
    use crate::tools::ToolRegistry;
    use config::EngineConfig;

    struct CrashingAgent(&'static str);

    #[async_trait]
    impl Agent for CrashingAgent {
        fn name(&self) -> &str {
            self.0
        }
        async fn invoke(
            &self,
            _state: OrchestrationState,
        ) -> Result<OrchestrationState, AgentError> {
            Err(AgentError::ExecutionFailed("boom".to_string()))
        }
    }

    fn context() -> Arc<EngineContext> {
        Arc::new(EngineContext {
            config: EngineConfig::default(),
            bus: Arc::new(EventBus::new()),
            llm: Arc::new(MockLlm::new("")),
            tools: Arc::new(ToolRegistry::new()),
        })
    }

    /// **Scenario**: an architect crash injects a minimal one-file plan and a
    /// bypass history entry; the run continues.
    #[tokio::test]
    async fn architect_crash_bypassed_with_minimal_plan() {
        let node = AgentNode::new(
            Arc::new(CrashingAgent("architect")),
            NodeRole::Architect,
            context(),
        );
        let (state, next) = node.run(OrchestrationState::new("sort a list")).await.unwrap();

        let plan = state.plan.expect("bypass plan");
        assert_eq!(plan.files.len(), 1);
        assert!(plan.execution.steps.is_empty());
        assert_eq!(next, Next::Continue);
        assert!(state
            .history
            .iter()
            .any(|h| h.agent == "architect" && h.action == "bypass"));
    }

    /// **Scenario**: a reviewer crash passes the review with diagnostic
    /// feedback instead of blocking the pipeline.
    #[tokio::test]
    async fn reviewer_crash_bypassed_as_pass() {
        let node = AgentNode::new(
            Arc::new(CrashingAgent("reviewer")),
            NodeRole::Reviewer,
            context(),
        );
        let (state, next) = node.run(OrchestrationState::new("task")).await.unwrap();
        assert!(state.review_passed);
        assert!(state.review_feedback.contains("Review skipped"));
        assert_eq!(next, Next::Continue);
    }

    /// **Scenario**: an executor crash marks execution failed and takes the
    /// retry branch with the counters updated.
    #[tokio::test]
    async fn executor_crash_takes_retry_branch() {
        let ctx = context();
        let node = AgentNode::new(
            Arc::new(CrashingAgent("executor")),
            NodeRole::Executor,
            ctx.clone(),
        );
        let (_id, mut rx) = ctx.bus.subscribe(16);

        let (state, next) = node.run(OrchestrationState::new("task")).await.unwrap();
        assert!(!state.execution_success);
        assert_eq!(state.error_count, 1);
        assert_eq!(state.review_attempts, 0);
        assert!(!state.review_passed);
        assert_eq!(next, Next::Node("coder".to_string()));

        let mut saw_retry = false;
        while let Ok(line) = rx.try_recv() {
            let v: serde_json::Value = serde_json::from_str(&line).unwrap();
            if v["type"] == "retry" {
                saw_retry = true;
                assert_eq!(v["data"]["attempt"], 1);
            }
        }
        assert!(saw_retry);
    }

    /// **Scenario**: retry exhaustion ends the run instead of looping, and
    /// error_count never exceeds max_retries.
    #[tokio::test]
    async fn executor_retries_bounded() {
        let node = AgentNode::new(
            Arc::new(CrashingAgent("executor")),
            NodeRole::Executor,
            context(),
        );

        let mut state = OrchestrationState::new("task");
        state.max_retries = 2;
        let mut next = Next::Continue;
        for _ in 0..5 {
            let (s, n) = node.run(state).await.unwrap();
            state = s;
            next = n;
            if next == Next::End {
                break;
            }
        }
        assert_eq!(next, Next::End);
        assert_eq!(state.error_count, 2);
        assert!(state.error_count <= state.max_retries);
    }
}
