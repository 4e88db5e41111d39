//! Orchestration state: the single aggregate that flows through the machine.
//!
//! One run owns one [`OrchestrationState`]; agents mutate it sequentially and
//! the graph router reads it for conditional edges. No agent holds state of
//! its own.

mod plan;

pub use plan::{ExecutionPlan, ExecutionStep, FileSpec, Plan, PreviewType};

use serde::{Deserialize, Serialize};

use crate::compress;

/// Default cap for execution retry loops (Executor → Coder).
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default cap for review repair loops (Reviewer → Coder).
pub const DEFAULT_MAX_REVIEW_ATTEMPTS: u32 = 2;
/// Default conversation budget before compression kicks in.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4096;
/// How many recent messages compression preserves verbatim.
pub const COMPRESS_KEEP_RECENT: usize = 5;

/// One audit entry: which agent did what, with what result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub agent: String,
    pub action: String,
    pub result: String,
}

/// One message of conversation memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub compressed: bool,
}

/// State passed between agents in the orchestration graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestrationState {
    /// The user's original coding task.
    pub task: String,

    /// Structured plan from the Architect, once produced.
    pub plan: Option<Plan>,
    /// Cursor into `plan.files` for the Coder.
    pub current_file_index: usize,
    /// Cursor into plan subtasks.
    pub current_subtask: usize,

    /// Last generated code (single-file/legacy view).
    pub code: String,
    /// Path where that code was written.
    pub file_path: String,

    /// Review gate outputs.
    pub review_passed: bool,
    pub review_feedback: String,
    pub review_attempts: u32,
    pub max_review_attempts: u32,

    /// Executor outputs.
    pub execution_output: String,
    pub execution_success: bool,
    pub preview_url: Option<String>,

    /// Orchestration tracking.
    pub current_agent: String,
    pub error_count: u32,
    pub max_retries: u32,

    /// Append-only audit trail.
    pub history: Vec<HistoryEntry>,

    /// Conversation memory for context passing between agents.
    pub messages: Vec<Message>,
    /// Estimated tokens across `messages` (≈ chars / 4).
    pub context_tokens: usize,
    pub max_context_tokens: usize,
    pub context_compressed: bool,

    /// Every file this run has produced: relative path → content.
    pub workspace_files: std::collections::BTreeMap<String, String>,
}

impl OrchestrationState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            plan: None,
            current_file_index: 0,
            current_subtask: 0,
            code: String::new(),
            file_path: String::new(),
            review_passed: false,
            review_feedback: String::new(),
            review_attempts: 0,
            max_review_attempts: DEFAULT_MAX_REVIEW_ATTEMPTS,
            execution_output: String::new(),
            execution_success: false,
            preview_url: None,
            current_agent: String::new(),
            error_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            history: Vec::new(),
            messages: Vec::new(),
            context_tokens: 0,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            context_compressed: false,
            workspace_files: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Appends an audit entry.
    pub fn add_history(
        &mut self,
        agent: impl Into<String>,
        action: impl Into<String>,
        result: impl Into<String>,
    ) {
        self.history.push(HistoryEntry {
            agent: agent.into(),
            action: action.into(),
            result: result.into(),
        });
    }

    /// Whether another execution retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.error_count < self.max_retries
    }

    /// Whether another review repair round is allowed.
    pub fn can_retry_review(&self) -> bool {
        self.review_attempts < self.max_review_attempts
    }

    /// Appends a message to conversation memory and refreshes the token
    /// estimate.
    pub fn add_message(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        agent: Option<String>,
    ) {
        self.messages.push(Message {
            role: role.into(),
            content: content.into(),
            agent,
            compressed: false,
        });
        self.context_tokens = compress::estimate_tokens(&self.messages);
    }

    /// The last `max_messages` messages, oldest first.
    pub fn get_context_messages(&self, max_messages: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }

    /// True when the conversation estimate exceeds the budget.
    pub fn should_compress_context(&self) -> bool {
        self.context_tokens > self.max_context_tokens
    }

    /// Compresses conversation memory down to a summary plus the last
    /// `keep_recent` messages. Idempotent; `context_compressed` flips to true
    /// on the first effective compression only.
    pub fn compress_context(&mut self, keep_recent: usize) {
        let messages = std::mem::take(&mut self.messages);
        let (messages, changed) = compress::compress_messages(messages, keep_recent);
        self.messages = messages;
        if changed {
            self.context_compressed = true;
            self.context_tokens = compress::estimate_tokens(&self.messages);
        }
    }

    /// Records a produced file.
    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.workspace_files.insert(path.into(), content.into());
    }
}
