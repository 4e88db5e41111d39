//! Typed engine configuration read from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::ConfigError;

/// Which inference runtime the factory should construct for a URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RuntimeHint {
    /// CPU-profile runtime (llama.cpp style server).
    Local,
    /// GPU-profile runtime (vLLM style server).
    Gpu,
    /// Decide from `INFERENCE_RUNTIME` at client creation, defaulting to local.
    #[default]
    Auto,
}

impl std::str::FromStr for RuntimeHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "llama-cpp" | "cpu" => Ok(Self::Local),
            "gpu" | "vllm" => Ok(Self::Gpu),
            "auto" | "" => Ok(Self::Auto),
            other => Err(format!("unknown runtime hint: {other} (use local, gpu, or auto)")),
        }
    }
}

/// All engine knobs from the environment table. Every field has the
/// documented default, so `EngineConfig::from_env()` succeeds on an empty
/// environment.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Root directory for all workspace file operations.
    pub workspace_dir: PathBuf,
    /// Primary inference endpoint.
    pub inference_url: String,
    /// Secondary inference endpoint, probed when the primary is down.
    pub inference_fallback_url: Option<String>,
    /// Runtime hint for client construction.
    pub inference_runtime: RuntimeHint,
    /// Model name sent in chat completion requests.
    pub inference_model: String,
    /// Wall-clock budget for one LLM call.
    pub agent_timeout: Duration,
    /// Wall-clock budget for one foreground execution step.
    pub execution_timeout: Duration,
    /// Return canned responses instead of calling the inference backend.
    pub mock_llm: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/workspace"),
            inference_url: "http://inference:8000".to_string(),
            inference_fallback_url: None,
            inference_runtime: RuntimeHint::Auto,
            inference_model: "tinyllama".to_string(),
            agent_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(120),
            mock_llm: false,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env_nonempty(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(Duration::from_secs_f64)
            .map(Some)
            .ok_or(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

fn env_bool(key: &str) -> bool {
    matches!(
        env_nonempty(key).as_deref().map(str::to_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

impl EngineConfig {
    /// Reads the configuration from the process environment, applying the
    /// documented default for every unset variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(dir) = env_nonempty("WORKSPACE_DIR") {
            cfg.workspace_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_nonempty("INFERENCE_URL") {
            cfg.inference_url = url;
        }
        cfg.inference_fallback_url = env_nonempty("INFERENCE_FALLBACK_URL");
        if let Some(raw) = env_nonempty("INFERENCE_RUNTIME") {
            cfg.inference_runtime =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "INFERENCE_RUNTIME".to_string(),
                    value: raw,
                })?;
        }
        if let Some(model) = env_nonempty("INFERENCE_MODEL") {
            cfg.inference_model = model;
        }
        if let Some(t) = env_secs("AGENT_TIMEOUT")? {
            cfg.agent_timeout = t;
        }
        if let Some(t) = env_secs("EXECUTION_TIMEOUT")? {
            cfg.execution_timeout = t;
        }
        cfg.mock_llm = env_bool("MOCK_LLM") || env_bool("MOCK_MODE");

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: empty environment yields the documented defaults.
    #[test]
    fn defaults_match_documentation() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.workspace_dir, PathBuf::from("/workspace"));
        assert_eq!(cfg.inference_url, "http://inference:8000");
        assert!(cfg.inference_fallback_url.is_none());
        assert_eq!(cfg.inference_runtime, RuntimeHint::Auto);
        assert_eq!(cfg.inference_model, "tinyllama");
        assert_eq!(cfg.agent_timeout, Duration::from_secs(60));
        assert_eq!(cfg.execution_timeout, Duration::from_secs(120));
        assert!(!cfg.mock_llm);
    }

    /// **Scenario**: runtime hint parses the documented values and rejects junk.
    #[test]
    fn runtime_hint_parses() {
        assert_eq!("local".parse::<RuntimeHint>().unwrap(), RuntimeHint::Local);
        assert_eq!("GPU".parse::<RuntimeHint>().unwrap(), RuntimeHint::Gpu);
        assert_eq!("auto".parse::<RuntimeHint>().unwrap(), RuntimeHint::Auto);
        assert!("warp-drive".parse::<RuntimeHint>().is_err());
    }

    /// **Scenario**: a non-numeric timeout surfaces as `InvalidValue`, not a panic.
    #[test]
    fn invalid_timeout_is_config_error() {
        std::env::set_var("AGENT_TIMEOUT", "soon");
        let err = EngineConfig::from_env().unwrap_err();
        std::env::remove_var("AGENT_TIMEOUT");
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "AGENT_TIMEOUT"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
