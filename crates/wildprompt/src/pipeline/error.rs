use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Wildcard expansion failed: {0}")]
    Expansion(#[from] crate::error::WildcardError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("Hook handler failed: {0}")]
    Failed(String),

    #[error("Unknown hook point: {0}")]
    UnknownHookPoint(String),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }
}
