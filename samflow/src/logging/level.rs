//! Log levels and records.

use crate::utils::timestamps::{format_log_timestamp, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Operational narration.
    #[default]
    Info,
    /// A recoverable problem, e.g. a skipped sample.
    #[serde(alias = "WARN")]
    Warning,
    /// A fatal problem.
    Error,
}

impl LogLevel {
    /// The upper-case label used in log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown log level '{0}' (expected DEBUG, INFO, WARNING or ERROR)")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warning => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// When the record was created.
    pub timestamp: Timestamp,
    /// Severity.
    pub level: LogLevel,
    /// The message.
    pub message: String,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            level,
            message: message.into(),
        }
    }

    /// Formats the record as `<timestamp> [<LEVEL>]: <message>`.
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "{} [{}]: {}",
            format_log_timestamp(&self.timestamp),
            self.level,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_parse_accepts_warn_alias() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(" debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), r#""WARNING""#);
        let level: LogLevel = serde_json::from_str(r#""WARN""#).unwrap();
        assert_eq!(level, LogLevel::Warning);
    }

    #[test]
    fn test_format_line() {
        let record = LogRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 20, 8, 15, 0).unwrap(),
            level: LogLevel::Warning,
            message: "No SAM artifact found for 'pl'".to_string(),
        };
        assert_eq!(
            record.format_line(),
            "2025-06-20 08:15:00,000 [WARNING]: No SAM artifact found for 'pl'"
        );
    }
}
