//! File-backed env sources: a minimal `.env` parser and the `[env]` table of
//! `crucible.toml`. Values are collected into maps; precedence is applied in
//! `load_and_apply`, not here.

use std::collections::HashMap;
use std::path::Path;

use crate::ConfigError;

/// Parses `.env` content: `KEY=VALUE` lines, `#` comments, surrounding quotes
/// stripped (double quotes support `\"`). No multiline values.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            value[1..value.len() - 1].to_string()
        } else {
            value.to_string()
        };
        out.insert(key.to_string(), value);
    }
    out
}

/// Loads a `.env` file into a map. A missing file yields an empty map.
pub fn load_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
    Ok(parse_dotenv(&content))
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Loads the `[env]` table of `crucible.toml` into a map. A missing file
/// yields an empty map; a malformed file is an error.
pub fn load_toml_env(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok(file.env)
}
