//! # Crucible
//!
//! A crash-tolerant multi-agent orchestration engine. A free-text coding task
//! flows through four specialised agents — Architect (plan), Coder (generate
//! files with streamed tokens), Reviewer (static gate), Executor (run the
//! plan) — coordinated by a deterministic state machine with bounded
//! retry/repair loops. Every observable transition fans out to subscribers as
//! a structured event.
//!
//! ## Design principles
//!
//! - **Single state type**: one [`OrchestrationState`] flows through all
//!   nodes; agents are state-in, state-out.
//! - **Crash bypass**: an agent failure becomes a neutral state mutation plus
//!   a history entry; the run continues instead of aborting.
//! - **Typed recovery**: raw failures are classified into
//!   `{category, recovery_strategy}` at the boundary ([`ErrorClassifier`]);
//!   retry policies are explicit values, not control flow.
//! - **Explicit context**: the event bus, inference client, and tool registry
//!   are constructed once and threaded into agents via [`EngineContext`];
//!   tests inject fakes through the same seams.
//!
//! ## Main modules
//!
//! - [`state`]: [`OrchestrationState`], [`Plan`], [`FileSpec`], [`ExecutionPlan`].
//! - [`graph`]: [`StateGraph`], [`CompiledStateGraph`], [`Node`], [`Next`] —
//!   build and run the agent state machine.
//! - [`agent`]: [`Agent`] trait, [`AgentCore`] shared LLM path, and the four
//!   pipeline agents.
//! - [`inference`]: [`CompletionClient`] seam, [`InferenceFactory`] with
//!   primary/fallback selection, OOM tier downgrade, and disconnect queueing.
//! - [`tools`]: [`Tool`] trait, [`ToolRegistry`], sandboxed grep / read_file.
//! - [`events`]: [`EventBus`] fan-out with per-subscriber failure isolation.
//! - [`classify`]: [`ErrorClassifier`], [`ClassifiedError`], [`RetryPolicy`].
//! - [`compress`]: pure, idempotent conversation compression.
//! - [`orchestrate`]: [`Engine`] — run entry point and graph wiring.

pub mod agent;
pub mod classify;
pub mod compress;
pub mod error;
pub mod events;
pub mod graph;
pub mod inference;
pub mod orchestrate;
pub mod state;
pub mod tools;

pub use agent::{
    Agent, AgentCore, ArchitectAgent, CoderAgent, ExecutorAgent, ReviewerAgent,
};
pub use classify::{
    connection_retry_policy, general_retry_policy, json_parse_retry_policy, ClassifiedError,
    ErrorCategory, ErrorClassifier, RecoveryStrategy, RetryPolicy,
};
pub use compress::{compress_messages, estimate_tokens};
pub use error::AgentError;
pub use events::EventBus;
pub use graph::{
    CompilationError, CompiledStateGraph, Next, Node, StateGraph, END, START,
};
pub use inference::{
    ChatMessage, CompletionClient, CompletionRequest, CompletionResponse, InferenceError,
    InferenceFactory, KvCacheStats, MockLlm, ModelTier, RuntimeKind, Usage,
};
pub use orchestrate::{Engine, EngineContext, RunReport};
pub use state::{
    ExecutionPlan, ExecutionStep, FileSpec, HistoryEntry, Message, OrchestrationState, Plan,
    PreviewType,
};
pub use tools::{GrepTool, ReadFileTool, Tool, ToolError, ToolRegistry, ToolResult, ToolSpec};
