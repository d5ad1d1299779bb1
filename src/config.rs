//! Configuration module for playrun
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/playrun/playrun.toml)
//! - User configuration (~/.playrun.toml)
//! - Project configuration (./playrun.toml)
//! - Environment variables (`PLAYRUN_*`)
//! - Command-line arguments (applied by the binary)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// How run progress is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human console lines
    #[default]
    Cli,
    /// Length-prefixed JSON events
    Json,
    /// One JSON document summarizing the run, printed at the end
    Struct,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" => Ok(OutputFormat::Cli),
            "json" => Ok(OutputFormat::Json),
            "struct" => Ok(OutputFormat::Struct),
            other => Err(format!(
                "unknown output format '{}' (expected cli, json or struct)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Cli => "cli",
            OutputFormat::Json => "json",
            OutputFormat::Struct => "struct",
        };
        f.write_str(name)
    }
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Show each task's parameters and full result data
    pub show_command_output: bool,

    /// Print the error that aborted a run
    pub debug: bool,

    /// Report format
    pub format: OutputFormat,

    /// Disable colored output
    pub no_color: bool,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, used when neither `-v` nor `RUST_LOG` is given
    pub level: String,

    /// Emit logs as JSON
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = vec![PathBuf::from("/etc/playrun/playrun.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".playrun.toml"));
        }

        paths.push(PathBuf::from("playrun.toml"));

        if let Ok(env_config) = std::env::var("PLAYRUN_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; set values in `other` win
    fn merge(&self, other: Config) -> Config {
        let defaults = Config::default();
        Config {
            output: OutputConfig {
                show_command_output: self.output.show_command_output
                    || other.output.show_command_output,
                debug: self.output.debug || other.output.debug,
                format: if other.output.format != defaults.output.format {
                    other.output.format
                } else {
                    self.output.format
                },
                no_color: self.output.no_color || other.output.no_color,
            },
            logging: LoggingConfig {
                level: if other.logging.level != defaults.logging.level {
                    other.logging.level
                } else {
                    self.logging.level.clone()
                },
                json: self.logging.json || other.logging.json,
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(show) = env_flag("PLAYRUN_SHOW_OUTPUT") {
            self.output.show_command_output = show;
        }

        if let Some(debug) = env_flag("PLAYRUN_DEBUG") {
            self.output.debug = debug;
        }

        if let Ok(format) = std::env::var("PLAYRUN_FORMAT") {
            if let Ok(format) = format.parse() {
                self.output.format = format;
            }
        }

        if std::env::var("NO_COLOR").is_ok() || std::env::var("PLAYRUN_NO_COLOR").is_ok() {
            self.output.no_color = true;
        }

        if let Ok(level) = std::env::var("PLAYRUN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = env_flag("PLAYRUN_LOG_JSON") {
            self.logging.json = json;
        }
    }

    /// Load from a specific file only
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output.format, OutputFormat::Cli);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.output.show_command_output);
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            output: OutputConfig {
                debug: true,
                ..OutputConfig::default()
            },
            ..Config::default()
        };
        let other = Config {
            output: OutputConfig {
                format: OutputFormat::Json,
                ..OutputConfig::default()
            },
            ..Config::default()
        };

        let merged = base.merge(other);
        assert!(merged.output.debug);
        assert_eq!(merged.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_from_toml_and_yaml_files() {
        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(toml_file, "[output]\nformat = \"struct\"\n[logging]\nlevel = \"debug\"").unwrap();
        let config = Config::from_file(toml_file.path()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Struct);
        assert_eq!(config.logging.level, "debug");

        let mut yaml_file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(yaml_file, "output:\n  show_command_output: true").unwrap();
        let config = Config::from_file(yaml_file.path()).unwrap();
        assert!(config.output.show_command_output);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "output = 3").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("PLAYRUN_FORMAT", "json");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.output.format, OutputFormat::Json);
        std::env::remove_var("PLAYRUN_FORMAT");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
