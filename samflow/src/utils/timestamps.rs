//! Timestamp formatting for artifacts, file names and log lines.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Format used inside file names; second granularity, no separators that
/// are awkward on any filesystem.
const FILE_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Format of the timestamp prefix on log lines.
const LOG_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use samflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&now_utc())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 string.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a timestamp for use in a file name, e.g. `20250616T142300`.
#[must_use]
pub fn format_file_timestamp(dt: &Timestamp) -> String {
    dt.format(FILE_FORMAT).to_string()
}

/// Formats a timestamp as a log line prefix, e.g. `2025-06-16 14:23:00,123`.
#[must_use]
pub fn format_log_timestamp(dt: &Timestamp) -> String {
    dt.format(LOG_FORMAT).to_string()
}
