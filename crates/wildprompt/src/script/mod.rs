//! Sandboxed tag scripts.
//!
//! Scripts are written in a small purpose-built language with no access to
//! the host: no imports, files, processes or reflection. Runs are bounded
//! by a step budget and an output cap.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod executor;
pub mod hook;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::ScriptError;
pub use executor::{check_denied, ScriptExecutor, ScriptResult, DENIED_KEYWORDS};
pub use hook::{apply_variables, context_variables, script_hook, SCRIPT_OUTPUT_KEY};
pub use value::Value;
