//! Inference backend access: one seam trait, two runtimes, one factory.
//!
//! Agents talk to [`CompletionClient`] only. In production that is
//! [`InferenceFactory`], which unifies a local-CPU runtime and a GPU-server
//! runtime behind primary/fallback selection, OOM tier downgrade, and a
//! disconnect queue. Tests and demo environments inject [`MockLlm`] through
//! the same seam.

mod factory;
mod http;
mod mock;
mod sse;

pub use factory::{
    InferenceFactory, ModelTier, RuntimeClient, MAX_OOM_FALLBACKS, MAX_RECONNECT_ATTEMPTS,
};
pub use http::HttpRuntimeClient;
pub use mock::MockLlm;
pub use sse::{parse_sse_line, LineBuffer, SseLine};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Which runtime profile a client speaks to. Both expose the same
/// OpenAI-style API; the distinction matters for logging and model listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// CPU profile (llama.cpp style server).
    Local,
    /// GPU profile (vLLM style server).
    Gpu,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Local => "local",
            RuntimeKind::Gpu => "gpu",
        }
    }
}

/// One chat message in a completion request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request for one chat completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model: String,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            max_tokens: 1024,
            temperature: 0.7,
            model: model.into(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token usage reported by the backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response from one chat completion.
#[derive(Clone, Debug, Default)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: String,
}

/// KV-cache telemetry derived from backend metrics. Read-only to agents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KvCacheStats {
    pub used_blocks: u64,
    pub total_blocks: u64,
    pub utilization_percent: f64,
    pub gpu_memory_used_mb: u64,
    pub gpu_memory_total_mb: u64,
}

/// Inference failure, after all client-side recovery has been exhausted.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Transport-level failure (connect, reset, DNS, body read).
    #[error("inference transport error: {0}")]
    Transport(String),

    /// Non-2xx response from the backend.
    #[error("inference returned status {code}: {body}")]
    Status { code: u16, body: String },

    /// The response body did not carry the expected shape.
    #[error("invalid inference response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("inference request timed out: {0}")]
    Timeout(String),

    /// Out of memory on the backend even after tier downgrades.
    #[error("inference out of memory after {fallbacks} tier fallbacks")]
    Oom { fallbacks: u32 },

    /// The backend stayed unreachable past the reconnect budget.
    #[error("inference disconnected after {attempts} reconnect attempts")]
    Disconnected { attempts: u32 },
}

/// The seam agents call for completions.
///
/// `stream_complete` sends content fragments through `chunk_tx` as they
/// arrive and still returns the full accumulated response. The default
/// implementation calls `complete` and emits the whole content as one chunk,
/// which is the correct degraded behaviour for non-streaming backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, InferenceError>;

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let response = self.complete(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx.send(response.content.clone()).await;
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient {
        content: String,
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, InferenceError> {
            Ok(CompletionResponse {
                content: self.content.clone(),
                ..Default::default()
            })
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::new("user", "hi")], "tinyllama")
    }

    /// **Scenario**: the default stream_complete emits the whole content as a
    /// single chunk.
    #[tokio::test]
    async fn default_stream_sends_one_chunk() {
        let client = StubClient {
            content: "hello".to_string(),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let resp = client.stream_complete(request(), Some(tx)).await.unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    /// **Scenario**: empty content produces no chunk.
    #[tokio::test]
    async fn default_stream_skips_empty_content() {
        let client = StubClient {
            content: String::new(),
        };
        let (tx, mut rx) = mpsc::channel(4);
        client.stream_complete(request(), Some(tx)).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
