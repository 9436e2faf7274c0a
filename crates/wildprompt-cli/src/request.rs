use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use wildprompt::{PromptSettings, SessionState, SourceRow};

/// `process` input file.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub source_row: SourceRow,
    /// Falls back to the configured settings when absent.
    #[serde(default)]
    pub settings: Option<PromptSettings>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub postfix: String,
    #[serde(default)]
    pub scripts: Vec<ScriptSpec>,
}

/// A script registered as a pipeline hook for one request.
#[derive(Debug, Deserialize)]
pub struct ScriptSpec {
    pub hook_point: String,
    #[serde(default)]
    pub priority: Option<i32>,
    pub source: String,
}

pub fn load_request(path: &Path) -> Result<ProcessRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid request JSON in '{}'", path.display()))
}

/// A missing session file starts a fresh session.
pub fn load_session(path: &Path) -> Result<SessionState> {
    if !path.exists() {
        return Ok(SessionState::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid session JSON in '{}'", path.display()))
}

pub fn save_session(path: &Path, session: &SessionState) -> Result<()> {
    let content = serde_json::to_string_pretty(session)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write session '{}'", path.display()))
}

/// Parses `name=a,b,c` into a variable name and its tags.
pub fn parse_tags_arg(arg: &str) -> Result<(String, Vec<String>)> {
    let (name, tags) = arg
        .split_once('=')
        .with_context(|| format!("Expected NAME=TAGS, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Variable name must not be empty in '{}'", arg);
    }
    Ok((name.to_string(), wildprompt::tags::split_tags(tags)))
}
