//! Mock completion client for tests and demo environments.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    CompletionClient, CompletionRequest, CompletionResponse, InferenceError, Usage,
};

/// Scripted [`CompletionClient`]: returns queued responses in order, then
/// repeats the last one. Streaming splits content into word chunks so token
/// events flow like a real backend.
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl MockLlm {
    /// Always returns `response`.
    pub fn new(response: impl Into<String>) -> Self {
        let response = response.into();
        Self {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(response),
        }
    }

    /// Returns `responses` in order; the final one repeats thereafter.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let mut queue: VecDeque<String> = responses.into();
        let last = queue.back().cloned().unwrap_or_default();
        // Keep the final response out of the queue; it is the repeat value.
        if !queue.is_empty() {
            queue.pop_back();
        }
        Self {
            responses: Mutex::new(queue),
            last: Mutex::new(last),
        }
    }

    fn next_response(&self) -> String {
        let mut queue = self.responses.lock().expect("mock queue lock");
        match queue.pop_front() {
            Some(next) => next,
            None => self.last.lock().expect("mock last lock").clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for MockLlm {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        let content = self.next_response();
        let completion_tokens = content.split_whitespace().count() as u64;
        Ok(CompletionResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
            }),
            model: "mock".to_string(),
            finish_reason: "stop".to_string(),
        })
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let response = self.complete(request).await?;
        if let Some(tx) = chunk_tx {
            for chunk in response.content.split_inclusive(' ') {
                let _ = tx.send(chunk.to_string()).await;
            }
        }
        Ok(response)
    }
}
