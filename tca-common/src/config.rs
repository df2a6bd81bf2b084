//! Bootstrap configuration loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TCA_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/tca/config.toml` on Linux)
//! 4. Compiled defaults (no file)
//!
//! A missing config file is not fatal: a warning is logged and compiled
//! defaults are used. A file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TCA_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// The `[policy]` table is kept raw here; the planner crate owns its schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Directory where campaign documents are written (one file per run)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Regions analyzed when the caller supplies none
    #[serde(default = "default_regions")]
    pub default_regions: Vec<String>,

    /// Raw `[policy]` table, interpreted by the planner
    #[serde(default)]
    pub policy: toml::Table,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            logging: LoggingConfig::default(),
            default_regions: default_regions(),
            policy: toml::Table::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_regions() -> Vec<String> {
    ["US", "GB", "CA", "AU", "IN"]
        .iter()
        .map(|r| r.to_string())
        .collect()
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Parse config from a TOML string
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the config file and load it, falling back to compiled defaults
    ///
    /// Only a file that exists but is malformed produces an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration");
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using compiled defaults"
                );
                Ok(Self::default())
            }
            None => {
                info!("No config file located, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Resolve the config file path
///
/// Returns `None` only when no candidate location could be determined.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("tca").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.default_regions, vec!["US", "GB", "CA", "AU", "IN"]);
        assert!(config.policy.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.default_regions.len(), 5);
    }

    #[test]
    fn test_policy_table_is_kept_raw() {
        let config = TomlConfig::parse(
            r#"
            [policy]
            duration_weeks = 8

            [policy.weights]
            engagement = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(
            config.policy.get("duration_weeks").and_then(|v| v.as_integer()),
            Some(8)
        );
        assert!(config.policy.get("weights").is_some());
    }

    #[test]
    fn test_cli_arg_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")));
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }
}
