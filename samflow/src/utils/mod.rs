//! Utility functions for run identity, timestamps and directory checks.

mod run_id;
pub mod timestamps;
pub mod validation;

pub use run_id::{generate_uuid, generate_uuid_v7, RunId};
pub use timestamps::{iso_timestamp, now_utc, Timestamp};
pub use validation::{list_files_with_extension, normalize_dir, validate_dir, NormalizedDir};
