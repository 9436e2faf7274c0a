use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Script rejected: forbidden keyword '{keyword}'")]
    Denied { keyword: String },

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Runtime error on line {line}: {message}")]
    Runtime { line: usize, message: String },

    #[error("Script exceeded the step limit of {0}")]
    StepLimit(u64),

    #[error("Variable '{name}' must be a list of tags, got {found}")]
    InvalidVariable { name: String, found: &'static str },
}
