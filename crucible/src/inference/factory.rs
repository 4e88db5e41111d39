//! Runtime selection with tiered fallback.
//!
//! The factory owns up to two runtime clients (primary, fallback) and an
//! active selection that follows health probes. Failures during completion
//! are recovered in two ways: out-of-memory errors downgrade the model tier
//! and retry; connection loss enqueues the request, backs off, forces
//! reselection, and retries. Both budgets are hard caps.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use config::{EngineConfig, RuntimeHint};

use super::http::HttpRuntimeClient;
use super::{
    CompletionClient, CompletionRequest, CompletionResponse, InferenceError, KvCacheStats,
    RuntimeKind,
};

/// Maximum OOM tier downgrades before giving up.
pub const MAX_OOM_FALLBACKS: u32 = 2;
/// Maximum reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Bounded request queue size; overflow drops new entries.
const MAX_QUEUE_SIZE: usize = 10;

/// Model tiers by VRAM requirement. Downgrading moves one step smaller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
    Large,
    Medium,
    Small,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Large => "large",
            ModelTier::Medium => "medium",
            ModelTier::Small => "small",
        }
    }

    /// Model served at this tier.
    pub fn model(&self) -> &'static str {
        match self {
            ModelTier::Large => "qwen2.5-coder-14b",
            ModelTier::Medium => "qwen2.5-coder-7b",
            ModelTier::Small => "tinyllama",
        }
    }

    /// Minimum VRAM (GB) the tier needs.
    pub fn min_vram_gb(&self) -> f64 {
        match self {
            ModelTier::Large => 20.0,
            ModelTier::Medium => 8.0,
            ModelTier::Small => 4.0,
        }
    }

    /// One step smaller, or None at the floor.
    pub fn downgrade(&self) -> Option<ModelTier> {
        match self {
            ModelTier::Large => Some(ModelTier::Medium),
            ModelTier::Medium => Some(ModelTier::Small),
            ModelTier::Small => None,
        }
    }

    /// Largest tier that fits the given VRAM; the smallest tier is the floor.
    pub fn recommended(vram_gb: f64) -> ModelTier {
        if vram_gb >= ModelTier::Large.min_vram_gb() {
            ModelTier::Large
        } else if vram_gb >= ModelTier::Medium.min_vram_gb() {
            ModelTier::Medium
        } else {
            ModelTier::Small
        }
    }
}

/// One runtime endpoint as the factory sees it. [`HttpRuntimeClient`] is the
/// production implementation; tests drive the factory with scripted fakes.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError>;

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError>;

    async fn health_check(&self) -> bool;

    fn runtime(&self) -> RuntimeKind;
}

#[async_trait]
impl RuntimeClient for HttpRuntimeClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        HttpRuntimeClient::complete(self, request).await
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError> {
        HttpRuntimeClient::stream_complete(self, request, chunk_tx).await
    }

    async fn health_check(&self) -> bool {
        HttpRuntimeClient::health_check(self).await
    }

    fn runtime(&self) -> RuntimeKind {
        HttpRuntimeClient::runtime(self)
    }
}

struct Inner {
    primary: Option<Arc<dyn RuntimeClient>>,
    fallback: Option<Arc<dyn RuntimeClient>>,
    active: Option<Arc<dyn RuntimeClient>>,
    current_tier: ModelTier,
    oom_count: u32,
    reconnect_attempts: u32,
    queue: VecDeque<CompletionRequest>,
    kv_stats: Option<KvCacheStats>,
}

/// Factory over the inference runtimes. Process-wide: one instance per
/// engine, shared by all agents; internal state is mutex-guarded.
pub struct InferenceFactory {
    primary_url: String,
    fallback_url: Option<String>,
    hint: RuntimeHint,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl InferenceFactory {
    pub fn new(
        primary_url: impl Into<String>,
        fallback_url: Option<String>,
        hint: RuntimeHint,
        timeout: Duration,
    ) -> Self {
        Self {
            primary_url: primary_url.into(),
            fallback_url,
            hint,
            timeout,
            inner: Mutex::new(Inner {
                primary: None,
                fallback: None,
                active: None,
                current_tier: ModelTier::Large,
                oom_count: 0,
                reconnect_attempts: 0,
                queue: VecDeque::new(),
                kv_stats: None,
            }),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(
            cfg.inference_url.clone(),
            cfg.inference_fallback_url.clone(),
            cfg.inference_runtime,
            cfg.agent_timeout,
        )
    }

    /// Test constructor: pre-seeded runtime clients, no URL construction.
    pub fn with_clients(
        primary: Arc<dyn RuntimeClient>,
        fallback: Option<Arc<dyn RuntimeClient>>,
    ) -> Self {
        let factory = Self::new(String::new(), None, RuntimeHint::Auto, Duration::from_secs(60));
        {
            let mut inner = factory.inner.try_lock().expect("fresh factory lock");
            inner.primary = Some(primary);
            inner.fallback = fallback;
        }
        factory
    }

    fn runtime_kind(&self) -> RuntimeKind {
        match self.hint {
            RuntimeHint::Gpu => RuntimeKind::Gpu,
            RuntimeHint::Local | RuntimeHint::Auto => RuntimeKind::Local,
        }
    }

    fn make_client(&self, url: &str) -> Arc<dyn RuntimeClient> {
        Arc::new(HttpRuntimeClient::new(url, self.runtime_kind(), self.timeout))
    }

    /// Returns the client to use: the healthy active one, else the first
    /// healthy of primary/fallback, else primary so the caller surfaces the
    /// error.
    pub async fn get_client(&self) -> Arc<dyn RuntimeClient> {
        let (active, mut primary, mut fallback) = {
            let inner = self.inner.lock().await;
            (
                inner.active.clone(),
                inner.primary.clone(),
                inner.fallback.clone(),
            )
        };

        if let Some(active) = active {
            if active.health_check().await {
                return active;
            }
        }

        if primary.is_none() {
            primary = Some(self.make_client(&self.primary_url));
        }
        let primary = primary.expect("primary client exists");
        if primary.health_check().await {
            info!(runtime = primary.runtime().as_str(), "using primary inference");
            let mut inner = self.inner.lock().await;
            inner.primary = Some(primary.clone());
            inner.active = Some(primary.clone());
            return primary;
        }

        if fallback.is_none() {
            if let Some(url) = &self.fallback_url {
                fallback = Some(self.make_client(url));
            }
        }
        if let Some(fallback) = fallback {
            if fallback.health_check().await {
                warn!(
                    runtime = fallback.runtime().as_str(),
                    "primary inference unavailable, using fallback"
                );
                let mut inner = self.inner.lock().await;
                inner.fallback = Some(fallback.clone());
                inner.active = Some(fallback.clone());
                return fallback;
            }
            let mut inner = self.inner.lock().await;
            inner.fallback = Some(fallback);
        }

        error!("no healthy inference service available");
        let mut inner = self.inner.lock().await;
        inner.primary = Some(primary.clone());
        inner.active = Some(primary.clone());
        primary
    }

    fn is_oom(message: &str) -> bool {
        let m = message.to_lowercase();
        m.contains("out of memory") || m.contains("oom") || m.contains("cuda")
    }

    fn is_disconnect(error: &InferenceError) -> bool {
        match error {
            InferenceError::Transport(_) | InferenceError::Timeout(_) => true,
            other => {
                let m = other.to_string().to_lowercase();
                m.contains("connection") || m.contains("timeout") || m.contains("timed out")
            }
        }
    }

    /// Completion with OOM tier downgrade and disconnect recovery.
    pub async fn complete_with_fallback(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        let mut request = request;
        loop {
            let client = self.get_client().await;
            let err = match client.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if Self::is_oom(&err.to_string()) {
                let (fallbacks, tier) = {
                    let mut inner = self.inner.lock().await;
                    if inner.oom_count >= MAX_OOM_FALLBACKS {
                        return Err(InferenceError::Oom {
                            fallbacks: inner.oom_count,
                        });
                    }
                    inner.oom_count += 1;
                    match inner.current_tier.downgrade() {
                        Some(tier) => {
                            inner.current_tier = tier;
                            (inner.oom_count, tier)
                        }
                        None => {
                            return Err(InferenceError::Oom {
                                fallbacks: inner.oom_count,
                            })
                        }
                    }
                };
                warn!(
                    tier = tier.as_str(),
                    fallbacks, "OOM from backend, downgrading model tier"
                );
                request.model = tier.model().to_string();
                continue;
            }

            if Self::is_disconnect(&err) {
                let attempt = {
                    let mut inner = self.inner.lock().await;
                    if inner.queue.len() >= MAX_QUEUE_SIZE {
                        warn!("request queue full, dropping new request");
                    } else {
                        inner.queue.push_back(request.clone());
                    }
                    let attempt = inner.reconnect_attempts;
                    inner.reconnect_attempts += 1;
                    inner.active = None; // force reselection
                    attempt
                };
                if attempt >= MAX_RECONNECT_ATTEMPTS {
                    return Err(InferenceError::Disconnected { attempts: attempt });
                }
                let delay = Duration::from_secs(2u64.saturating_pow(attempt).min(30));
                warn!(attempt, delay_s = delay.as_secs(), "inference disconnected, backing off");
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(err);
        }
    }

    /// Drains the queue against the now-active client. Failures are logged
    /// and dropped, never re-queued.
    pub async fn process_queue(&self) -> Vec<CompletionResponse> {
        let drained: Vec<CompletionRequest> = {
            let mut inner = self.inner.lock().await;
            inner.queue.drain(..).collect()
        };
        if drained.is_empty() {
            return Vec::new();
        }
        info!(requests = drained.len(), "processing queued inference requests");

        let mut results = Vec::new();
        for request in drained {
            let client = self.get_client().await;
            match client.complete(&request).await {
                Ok(response) => results.push(response),
                Err(e) => warn!(error = %e, "queued request failed, dropping"),
            }
        }
        results
    }

    /// Ingests raw backend metrics into derived KV-cache stats.
    pub async fn update_kv_cache_stats(&self, raw: &Value) {
        let used = raw["num_used_gpu_blocks"].as_u64().unwrap_or(0);
        let total = raw["num_total_gpu_blocks"].as_u64().unwrap_or(0);
        let utilization = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        let stats = KvCacheStats {
            used_blocks: used,
            total_blocks: total,
            utilization_percent: utilization,
            gpu_memory_used_mb: raw["gpu_memory_used_mb"]
                .as_u64()
                .or_else(|| raw["gpu_memory_used"].as_u64())
                .unwrap_or(0),
            gpu_memory_total_mb: raw["gpu_memory_total_mb"]
                .as_u64()
                .or_else(|| raw["gpu_memory_total"].as_u64())
                .unwrap_or(0),
        };
        self.inner.lock().await.kv_stats = Some(stats);
    }

    pub async fn kv_cache_stats(&self) -> Option<KvCacheStats> {
        self.inner.lock().await.kv_stats
    }

    pub async fn current_tier(&self) -> ModelTier {
        self.inner.lock().await.current_tier
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().await.reconnect_attempts
    }

    pub async fn queued_requests(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    #[cfg(test)]
    async fn set_tier(&self, tier: ModelTier) {
        self.inner.lock().await.current_tier = tier;
    }

    #[cfg(test)]
    async fn set_oom_count(&self, count: u32) {
        self.inner.lock().await.oom_count = count;
    }
}

#[async_trait]
impl CompletionClient for InferenceFactory {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, InferenceError> {
        self.complete_with_fallback(request).await
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<CompletionResponse, InferenceError> {
        let client = self.get_client().await;
        client.stream_complete(&request, chunk_tx).await
    }
}
