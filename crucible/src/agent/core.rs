//! Shared agent machinery: the LLM call path with retry layers, streaming
//! token emission, tool-call parsing, and tool execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use event_wire::EventKind;

use crate::classify::{
    connection_retry_policy, fix_prompt, json_parse_retry_policy, ClassifiedError, ErrorCategory,
    ErrorClassifier, RecoveryStrategy,
};
use crate::error::AgentError;
use crate::inference::{ChatMessage, CompletionRequest};
use crate::orchestrate::EngineContext;
use crate::tools::ToolResult;

use super::canned_response;

/// One tool invocation extracted from an LLM response.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

static FENCED_TOOL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|tool)?\s*(\{[^`]*?\})\s*```").expect("fenced tool regex")
});

static INLINE_TOOL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{"tool"\s*:\s*"(\w+)"[^}]*\}"#).expect("inline tool regex"));

/// Per-agent handle on the engine: name, system prompt, shared context, and
/// a token counter for telemetry.
pub struct AgentCore {
    name: &'static str,
    system_prompt: &'static str,
    ctx: Arc<EngineContext>,
    tokens_used: AtomicU64,
}

impl AgentCore {
    pub fn new(name: &'static str, system_prompt: &'static str, ctx: Arc<EngineContext>) -> Self {
        Self {
            name,
            system_prompt,
            ctx,
            tokens_used: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ctx(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    fn request(&self, messages: &[ChatMessage], max_tokens: u32) -> CompletionRequest {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(ChatMessage::new("system", self.system_prompt));
        full.extend(messages.iter().cloned());
        CompletionRequest::new(full, self.ctx.config.inference_model.clone())
            .with_max_tokens(max_tokens)
    }

    /// Calls the inference backend, retrying connection/timeout failures
    /// under the connection policy. Other failures propagate immediately.
    pub async fn call_llm(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, AgentError> {
        if self.ctx.config.mock_llm {
            info!(agent = self.name, "mock mode: returning canned response");
            let response = canned_response(self.name);
            self.tokens_used
                .fetch_add(response.split_whitespace().count() as u64, Ordering::Relaxed);
            return Ok(response);
        }

        let policy = connection_retry_policy();
        let classifier = ErrorClassifier::new();
        let mut attempt = 0u32;

        loop {
            let started = std::time::Instant::now();
            match self.ctx.llm.complete(self.request(messages, max_tokens)).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        self.tokens_used
                            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
                    }
                    info!(
                        agent = self.name,
                        duration_s = started.elapsed().as_secs_f64(),
                        "LLM call completed"
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let classified = classifier
                        .classify(e.to_string(), Some(json!({ "agent": self.name })));
                    let transient = matches!(
                        classified.category,
                        ErrorCategory::Connection | ErrorCategory::Timeout
                    );
                    if transient && policy.should_retry(attempt, &classified) {
                        let delay = policy.delay(attempt);
                        warn!(
                            agent = self.name,
                            attempt,
                            delay_s = delay.as_secs_f64(),
                            error = %e,
                            "LLM call failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    warn!(agent = self.name, error = %e, "LLM call failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Streaming variant: emits one `token` event per content fragment, then
    /// returns the accumulated text. Falls back to the non-streaming path on
    /// stream failure.
    pub async fn call_llm_streaming(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        file_path: Option<&str>,
    ) -> Result<String, AgentError> {
        if self.ctx.config.mock_llm {
            return self.call_llm(messages, max_tokens).await;
        }

        let (tx, mut rx) = mpsc::channel::<String>(128);
        let bus = self.ctx.bus.clone();
        let agent = self.name;
        let file_path = file_path.map(str::to_string);
        let forward = async move {
            while let Some(token) = rx.recv().await {
                bus.emit(
                    EventKind::Token,
                    agent,
                    json!({ "token": token, "file_path": file_path }),
                );
            }
        };

        let request = self.request(messages, max_tokens);
        let (result, ()) = tokio::join!(self.ctx.llm.stream_complete(request, Some(tx)), forward);

        match result {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    self.tokens_used
                        .fetch_add(usage.completion_tokens, Ordering::Relaxed);
                }
                Ok(response.content)
            }
            Err(e) => {
                warn!(agent = self.name, error = %e, "stream failed, falling back to non-streaming");
                self.call_llm(messages, max_tokens).await
            }
        }
    }

    /// Calls the LLM and parses the response, retrying parse failures with a
    /// format-fix prompt under the parse policy.
    pub async fn call_llm_with_json_retry<T, F>(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        parser: F,
    ) -> Result<T, AgentError>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        let policy = json_parse_retry_policy();
        let mut messages = messages;
        let mut attempt = 0u32;

        loop {
            let response = self.call_llm(&messages, max_tokens).await?;
            match parser(&response) {
                Ok(value) => return Ok(value),
                Err(parse_msg) => {
                    let classified = ClassifiedError {
                        category: ErrorCategory::Parse,
                        message: parse_msg.clone(),
                        recovery_strategy: RecoveryStrategy::Reformat,
                        context: Some(json!({ "agent": self.name })),
                    };
                    if !policy.should_retry(attempt, &classified) {
                        return Err(AgentError::Parse(parse_msg));
                    }
                    warn!(agent = self.name, attempt, error = %parse_msg, "parse failed, requesting reformat");
                    messages.push(ChatMessage::new("assistant", response));
                    messages.push(ChatMessage::new("user", fix_prompt(&classified)));
                    attempt += 1;
                }
            }
        }
    }

    /// Extracts tool calls from an LLM response: fenced ```json/```tool
    /// blocks first, then inline `{"tool": ...}` objects. Duplicates are
    /// dropped.
    pub fn parse_tool_calls(&self, response: &str) -> Vec<ToolCall> {
        let mut calls: Vec<ToolCall> = Vec::new();

        let mut push_unique = |call: ToolCall| {
            if !calls.contains(&call) {
                calls.push(call);
            }
        };

        for captures in FENCED_TOOL_CALL.captures_iter(response) {
            let Ok(value) = serde_json::from_str::<Value>(&captures[1]) else {
                continue;
            };
            if let Some(tool) = value.get("tool").and_then(Value::as_str) {
                push_unique(ToolCall {
                    tool: tool.to_string(),
                    args: value.get("args").cloned().unwrap_or_else(|| json!({})),
                });
            }
        }

        for m in INLINE_TOOL_CALL.find_iter(response) {
            let Ok(value) = serde_json::from_str::<Value>(m.as_str()) else {
                continue;
            };
            if let Some(tool) = value.get("tool").and_then(Value::as_str) {
                push_unique(ToolCall {
                    tool: tool.to_string(),
                    args: value.get("args").cloned().unwrap_or_else(|| json!({})),
                });
            }
        }

        calls
    }

    /// Executes a registered tool and emits a `tool_executed` event.
    pub async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        let result = self.ctx.tools.execute(name, args).await;
        self.ctx.bus.emit(
            EventKind::ToolExecuted,
            self.name,
            json!({ "tool": name, "success": result.success }),
        );
        result
    }
}
