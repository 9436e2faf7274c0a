use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";
const MAX_DEPTH_LIMIT: usize = 64;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Platform config location: `<config dir>/wildprompt/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wildprompt").join("config.json"))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.wildcard_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "wildcard_directory must not be empty".to_string(),
        });
    }

    let depth = config.expansion.max_depth;
    if depth == 0 || depth > MAX_DEPTH_LIMIT {
        return Err(ConfigError::Validation {
            message: format!(
                "expansion.max_depth must be between 1 and {}, got {}",
                MAX_DEPTH_LIMIT, depth
            ),
        });
    }

    if config.script.max_steps == 0 {
        return Err(ConfigError::Validation {
            message: "script.max_steps must be greater than zero".to_string(),
        });
    }

    Ok(())
}
