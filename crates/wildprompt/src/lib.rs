pub mod config;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod tags;
pub mod wildcard;

pub use config::{load_config, Config, PromptSettings};
pub use error::{ConfigError, Result, WildPromptError, WildcardError};
pub use pipeline::{
    HookError, HookPoint, HookRegistry, PipelineError, PromptContext, PromptProcessor,
    SessionState, SourceRow,
};
pub use script::{ScriptExecutor, ScriptResult};
pub use wildcard::{WildcardExpander, WildcardStore};
