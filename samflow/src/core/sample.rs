//! Sample identifiers and sample sheet rows.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Short identifier naming one sample or species within a batch.
///
/// Keys are trimmed on construction and compare lexicographically, which is
/// the order batch results and warnings are reported in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleKey(String);

impl SampleKey {
    /// Creates a key, returning `None` when the trimmed value is empty.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SampleKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SampleKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One row of a sample sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSheetEntry {
    /// The sample key.
    pub key: SampleKey,
    /// Path to the raw data file for this sample.
    pub data_path: PathBuf,
    /// Optional annotation label used to group cells in reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl SampleSheetEntry {
    /// Creates a new entry without annotation.
    #[must_use]
    pub fn new(key: SampleKey, data_path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            data_path: data_path.into(),
            annotation: None,
        }
    }

    /// Sets the annotation label.
    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }
}
