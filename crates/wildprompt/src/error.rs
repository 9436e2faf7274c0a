use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WildPromptError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wildcard error: {0}")]
    Wildcard(#[from] WildcardError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Script error: {0}")]
    Script(#[from] crate::script::ScriptError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WildcardError {
    #[error("Failed to create wildcard directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Wildcard scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Wildcard table lock poisoned")]
    LockPoisoned,

    #[error("Watch error: {0}")]
    WatchError(String),
}

pub type Result<T> = std::result::Result<T, WildPromptError>;
