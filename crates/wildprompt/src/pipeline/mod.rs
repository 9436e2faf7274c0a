pub mod context;
pub mod error;
pub mod format;
pub mod hooks;
pub mod runner;

pub use context::{PromptContext, SessionState, SourceRow, WildcardProgress};
pub use error::{HookError, PipelineError};
pub use hooks::{HookHandler, HookPoint, HookRegistry, DEFAULT_HOOK_PRIORITY};
pub use runner::{PromptProcessor, DETECTED_RESOLUTION_KEY, PIPELINE_NAME};
