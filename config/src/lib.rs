//! Engine configuration: process env, project `.env`, and an optional
//! `crucible.toml` override file, with priority **existing env > .env > toml**.
//!
//! [`load_and_apply`] fills the process environment from the file sources;
//! [`EngineConfig::from_env`] then reads the typed configuration the engine
//! consumes. Keeping the two steps separate lets tests set plain env vars
//! without touching the filesystem.
//!
//! The `.env` parser is deliberately minimal (KEY=VALUE, comments, quotes);
//! it never overwrites variables the process already has.

mod engine;
mod file_env;

pub use engine::{EngineConfig, RuntimeHint};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("parse crucible.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Loads `.env` and `crucible.toml` from `dir` (or the current directory) and
/// sets environment variables only for keys that are not already set, so the
/// existing process environment always wins.
pub fn load_and_apply(dir: Option<&Path>) -> Result<(), ConfigError> {
    let base = dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok());
    let Some(base) = base else {
        return Ok(());
    };

    let dotenv_map = file_env::load_dotenv(&base.join(".env"))?;
    let toml_map = file_env::load_toml_env(&base.join("crucible.toml"))?;

    let mut keys: std::collections::HashSet<&String> = dotenv_map.keys().collect();
    keys.extend(toml_map.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue;
        }
        if let Some(v) = dotenv_map.get(key).or_else(|| toml_map.get(key)) {
            std::env::set_var(key, v);
        }
    }
    Ok(())
}
