//! UUID generation and per-invocation run identity.

use super::timestamps::{format_file_timestamp, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new UUID v7 (time-ordered).
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Identity of one pipeline invocation.
///
/// Generated once when a run starts and threaded through every output name,
/// so uniqueness does not depend on two runs starting in different seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunId {
    id: Uuid,
    started_at: Timestamp,
}

impl RunId {
    /// Creates a run identity for a run starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: generate_uuid_v7(),
            started_at: now_utc(),
        }
    }

    /// Creates a run identity from explicit parts.
    #[must_use]
    pub fn from_parts(id: Uuid, started_at: Timestamp) -> Self {
        Self { id, started_at }
    }

    /// The full run UUID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Eight hex digits from the random tail of the UUID.
    ///
    /// The leading digits of a v7 UUID encode the time and would repeat
    /// for runs started close together.
    #[must_use]
    pub fn short(&self) -> String {
        let simple = self.id.simple().to_string();
        simple[simple.len() - 8..].to_string()
    }

    /// `<YYYYmmddTHHMMSS>_<short>`, used as the unique suffix of file names.
    #[must_use]
    pub fn file_suffix(&self) -> String {
        format!("{}_{}", format_file_timestamp(&self.started_at), self.short())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_generate_uuid_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_generate_uuid_v7() {
        assert_eq!(generate_uuid_v7().get_version_num(), 7);
    }

    #[test]
    fn test_run_id_short_is_eight_hex_digits() {
        let run = RunId::new();
        let short = run.short();
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(run.id().simple().to_string().ends_with(&short));
    }

    #[test]
    fn test_file_suffix_from_parts() {
        let id = Uuid::parse_str("01890a5d-ac96-774b-bcce-b302099a8057").unwrap();
        let started = Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 1).unwrap();
        let run = RunId::from_parts(id, started);

        assert_eq!(run.file_suffix(), "20250616T090001_099a8057");
        assert_eq!(run.to_string(), "01890a5d-ac96-774b-bcce-b302099a8057");
    }

    #[test]
    fn test_distinct_runs_have_distinct_suffixes() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a.file_suffix(), b.file_suffix());
    }
}
