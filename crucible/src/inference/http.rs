//! HTTP client for one inference runtime URL.
//!
//! Speaks the OpenAI-style chat completions API: `POST /v1/chat/completions`
//! (non-streaming and SSE streaming), `GET /health`, `GET /v1/models`.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::sse::{parse_sse_line, LineBuffer, SseLine};
use super::{
    CompletionRequest, CompletionResponse, InferenceError, RuntimeKind, Usage,
};

/// Client for a single runtime endpoint. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Clone)]
pub struct HttpRuntimeClient {
    base_url: String,
    runtime: RuntimeKind,
    http: reqwest::Client,
}

fn transport_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout(e.to_string())
    } else {
        InferenceError::Transport(e.to_string())
    }
}

impl HttpRuntimeClient {
    pub fn new(base_url: impl Into<String>, runtime: RuntimeKind, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            runtime,
            http,
        }
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn payload(request: &CompletionRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": stream,
        })
    }

    /// Non-streaming completion: POST, raise on non-2xx, extract
    /// `choices[0].message.content` and usage.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&Self::payload(request, false))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                InferenceError::InvalidResponse("missing choices[0].message.content".to_string())
            })?
            .to_string();
        let usage: Option<Usage> = serde_json::from_value(data["usage"].clone()).ok();
        let model = data["model"].as_str().unwrap_or(&request.model).to_string();
        let finish_reason = data["choices"][0]["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        Ok(CompletionResponse {
            content,
            usage,
            model,
            finish_reason,
        })
    }

    /// Streaming completion: POST with `stream: true`, parse `data:` lines,
    /// forward each content delta through `chunk_tx`, return the accumulated
    /// response.
    pub async fn stream_complete(
        &self,
        request: &CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&Self::payload(request, true))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let mut content = String::new();
        let mut buffer = LineBuffer::new();
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport_error)?;
            for line in buffer.push(&chunk) {
                match parse_sse_line(&line) {
                    SseLine::Delta(delta) => {
                        if let Some(tx) = &chunk_tx {
                            let _ = tx.send(delta.clone()).await;
                        }
                        content.push_str(&delta);
                    }
                    SseLine::Done => break 'read,
                    SseLine::Ignore => {}
                }
            }
        }

        debug!(chars = content.len(), "stream complete");
        Ok(CompletionResponse {
            content,
            usage: None,
            model: request.model.clone(),
            finish_reason: "stop".to_string(),
        })
    }

    /// True when `GET /health` answers 200.
    pub async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "health check failed");
                false
            }
        }
    }

    /// Loaded model listing (GPU runtime exposes this; best effort).
    pub async fn model_info(&self) -> Option<Value> {
        let resp = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json().await.ok()
    }
}
