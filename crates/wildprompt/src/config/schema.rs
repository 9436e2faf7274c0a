use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_STEPS: u64 = 100_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub wildcard_directory: String,
    #[serde(default)]
    pub settings: PromptSettings,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub script: ScriptConfig,
}

impl Config {
    /// Config with defaults everywhere except the wildcard directory.
    pub fn new(wildcard_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            wildcard_directory: wildcard_directory.into(),
            settings: PromptSettings::default(),
            expansion: ExpansionConfig::default(),
            script: ScriptConfig::default(),
        }
    }
}

/// Per-request prompt options.
///
/// Unknown keys are kept in `extra` so hook modules can read options the
/// core does not know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSettings {
    #[serde(default)]
    pub auto_fit_resolution: bool,
    #[serde(default)]
    pub wildcard_standalone: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Seed for reproducible random choices. `None` uses the thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}
