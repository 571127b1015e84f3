//! Pipeline configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `SAMFLOW_*` environment variables, then command-line flags.

use crate::errors::{Result, SamflowError};
use crate::logging::LogLevel;
use crate::sheet::SheetColumns;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`PipelineConfig::log_level`].
pub const ENV_LOG_LEVEL: &str = "SAMFLOW_LOG_LEVEL";
/// Environment variable overriding [`PipelineConfig::workers`].
pub const ENV_WORKERS: &str = "SAMFLOW_WORKERS";
/// Environment variable overriding [`PipelineConfig::stage_timeout_seconds`].
pub const ENV_STAGE_TIMEOUT: &str = "SAMFLOW_STAGE_TIMEOUT";

/// Settings shared by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum level written to the log stream.
    #[serde(default)]
    pub log_level: LogLevel,
    /// Extension of stored artifacts.
    #[serde(default = "default_extension")]
    pub artifact_extension: String,
    /// Maximum concurrent per-sample computations.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound on a single computation, in seconds.
    #[serde(default)]
    pub stage_timeout_seconds: Option<f64>,
    /// Fewest samples an alignment object can be assembled from.
    #[serde(default = "default_min_samples")]
    pub min_assembly_samples: usize,
    /// Sample sheet column names.
    #[serde(default)]
    pub sheet_columns: SheetColumns,
}

fn default_extension() -> String {
    crate::store::DEFAULT_EXTENSION.to_string()
}

fn default_workers() -> usize {
    1
}

fn default_min_samples() -> usize {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            artifact_extension: default_extension(),
            workers: default_workers(),
            stage_timeout_seconds: None,
            min_assembly_samples: default_min_samples(),
            sheet_columns: SheetColumns::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SamflowError::io("read config", path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| SamflowError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_env_vars(std::env::vars())
    }

    /// Applies overrides from the given variables.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_LOG_LEVEL => {
                    self.log_level = value
                        .parse()
                        .map_err(|e| SamflowError::Config(format!("{ENV_LOG_LEVEL}: {e}")))?;
                }
                ENV_WORKERS => {
                    self.workers = value
                        .parse()
                        .map_err(|e| SamflowError::Config(format!("{ENV_WORKERS}: {e}")))?;
                }
                ENV_STAGE_TIMEOUT => {
                    self.stage_timeout_seconds = if value.is_empty() {
                        None
                    } else {
                        Some(
                            value
                                .parse()
                                .map_err(|e| SamflowError::Config(format!("{ENV_STAGE_TIMEOUT}: {e}")))?,
                        )
                    };
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, seconds: Option<f64>) -> Self {
        self.stage_timeout_seconds = seconds;
        self
    }

    /// Sets the minimum assembly size.
    #[must_use]
    pub fn with_min_assembly_samples(mut self, samples: usize) -> Self {
        self.min_assembly_samples = samples;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(SamflowError::Config("workers must be at least 1".to_string()));
        }
        if let Some(seconds) = self.stage_timeout_seconds {
            if seconds <= 0.0 || Duration::try_from_secs_f64(seconds).is_err() {
                return Err(SamflowError::Config(format!(
                    "stage timeout must be a positive number of seconds, got {seconds}"
                )));
            }
        }
        if self.artifact_extension.trim_start_matches('.').is_empty() {
            return Err(SamflowError::Config("artifact extension must not be empty".to_string()));
        }
        if self.min_assembly_samples == 0 {
            return Err(SamflowError::Config("min_assembly_samples must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The stage timeout as a duration. Values [`validate`](Self::validate)
    /// rejects yield `None`.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }
}
