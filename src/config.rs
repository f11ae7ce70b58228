//! Configuration types for ioetap

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::recording::DEFAULT_MAX_LINE_LENGTH;
use crate::{Result, TapError};

/// Default tracing filter; quiet because logs share the terminal with the child's stderr
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Recording options
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Logging options
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Recording options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Recording file; defaults to `<basename>-<pid>.jsonl`
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Maximum bytes per recorded line (0 = unlimited)
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if let Some(output) = &self.recording.output {
            if output.as_os_str().is_empty() {
                return Err(TapError::Config("Output path cannot be empty".to_string()));
            }

            if output.is_dir() {
                return Err(TapError::Config(format!(
                    "Output path is a directory: {}",
                    output.display()
                )));
            }
        }

        if self.logging.filter.trim().is_empty() {
            return Err(TapError::Config("Log filter cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Recording file for a child, falling back to [`default_output_path`]
    #[must_use]
    pub fn output_path(&self, basename: &str, pid: u32) -> PathBuf {
        self.recording
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(basename, pid))
    }
}

/// Default recording file name: `<basename>-<pid>.jsonl`
#[must_use]
pub fn default_output_path(basename: &str, pid: u32) -> PathBuf {
    PathBuf::from(format!("{basename}-{pid}.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.recording.output, None);
        assert_eq!(config.recording.max_line_length, 16 * 1024 * 1024);
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            [recording]
            output = "session.jsonl"
            max_line_length = 0

            [logging]
            filter = "ioetap=debug"
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.recording.output, Some(PathBuf::from("session.jsonl")));
        assert_eq!(config.recording.max_line_length, 0);
        assert_eq!(config.logging.filter, "ioetap=debug");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[recording]\noutput = \"x.jsonl\"\n").unwrap();
        assert_eq!(config.recording.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.logging, LoggingConfig::default());

        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[recording]\nmax_line_length = 1024\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.recording.max_line_length, 1024);
    }

    #[test]
    fn test_negative_limit_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[recording]\nmax_line_length = -1\n").unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(TapError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::from_file(&temp_dir.path().join("nope.toml")),
            Err(TapError::Config(_))
        ));
    }

    #[test]
    fn test_output_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.recording.output = Some(temp_dir.path().to_path_buf());
        assert!(config.validate().is_err());

        config.recording.output = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path() {
        let mut config = Config::default();
        assert_eq!(config.output_path("ls", 42), PathBuf::from("ls-42.jsonl"));

        config.recording.output = Some(PathBuf::from("out.jsonl"));
        assert_eq!(config.output_path("ls", 42), PathBuf::from("out.jsonl"));
    }
}
