pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str};
pub use schema::{
    Config, ExpansionConfig, PromptSettings, ScriptConfig, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_STEPS,
};
