//! Sample sheet loading.
//!
//! A sample sheet is a CSV file with a header row. Each row names one
//! sample by key, points at its raw data file and optionally carries an
//! annotation label used to group cells in the report stage.

use crate::core::{SampleKey, SampleSheetEntry};
use crate::errors::SheetError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Column names used to read a sample sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetColumns {
    /// Column holding the sample key.
    #[serde(default = "default_key_column")]
    pub key: String,
    /// Column holding the raw data path.
    #[serde(default = "default_data_column")]
    pub data_path: String,
    /// Optional column holding the annotation label.
    #[serde(default = "default_annotation_column")]
    pub annotation: Option<String>,
}

fn default_key_column() -> String {
    "id2".to_string()
}

fn default_data_column() -> String {
    "h5ad".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_annotation_column() -> Option<String> {
    Some("annotation".to_string())
}

impl Default for SheetColumns {
    fn default() -> Self {
        Self {
            key: default_key_column(),
            data_path: default_data_column(),
            annotation: default_annotation_column(),
        }
    }
}

/// A parsed sample sheet. Row order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSheet {
    entries: Vec<SampleSheetEntry>,
}

impl SampleSheet {
    /// Reads a sheet from a CSV file.
    pub fn from_path(path: &Path, columns: &SheetColumns) -> Result<Self, SheetError> {
        let source_name = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| SheetError::Read {
            source_name: source_name.clone(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file, &source_name, columns)
    }

    /// Reads a sheet from any CSV source.
    ///
    /// `source_name` is only used in error messages.
    pub fn from_reader<R: Read>(
        reader: R,
        source_name: &str,
        columns: &SheetColumns,
    ) -> Result<Self, SheetError> {
        let read_error = |e: csv::Error| SheetError::Read {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers().map_err(read_error)?.clone();
        let position = |column: &str| headers.iter().position(|h| h == column);
        let missing = |column: &str| SheetError::MissingColumn {
            source_name: source_name.to_string(),
            column: column.to_string(),
        };

        let key_idx = position(&columns.key).ok_or_else(|| missing(&columns.key))?;
        let data_idx = position(&columns.data_path).ok_or_else(|| missing(&columns.data_path))?;
        // An absent annotation column is allowed; the sheet simply carries none.
        let annotation_idx = columns.annotation.as_deref().and_then(position);

        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (index, record) in csv_reader.records().enumerate() {
            let record = record.map_err(read_error)?;
            let row = index + 1;

            let key = record
                .get(key_idx)
                .and_then(SampleKey::new)
                .ok_or_else(|| SheetError::EmptyKey {
                    source_name: source_name.to_string(),
                    row,
                })?;

            if !seen.insert(key.clone()) {
                return Err(SheetError::DuplicateKey {
                    source_name: source_name.to_string(),
                    key: key.to_string(),
                    row,
                });
            }

            let data_path = record.get(data_idx).unwrap_or_default();
            let annotation = annotation_idx
                .and_then(|idx| record.get(idx))
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);

            entries.push(SampleSheetEntry {
                key,
                data_path: PathBuf::from(data_path),
                annotation,
            });
        }

        Ok(Self { entries })
    }

    /// Builds a sheet from parallel key and path lists.
    pub fn from_pairs<K, P>(keys: &[K], paths: &[P]) -> Result<Self, SheetError>
    where
        K: AsRef<str>,
        P: AsRef<Path>,
    {
        if keys.len() != paths.len() {
            return Err(SheetError::LengthMismatch {
                keys: keys.len(),
                paths: paths.len(),
            });
        }

        let mut entries = Vec::with_capacity(keys.len());
        let mut seen = HashSet::new();
        for (index, (key, path)) in keys.iter().zip(paths).enumerate() {
            let row = index + 1;
            let key = SampleKey::new(key).ok_or_else(|| SheetError::EmptyKey {
                source_name: "arguments".to_string(),
                row,
            })?;
            if !seen.insert(key.clone()) {
                return Err(SheetError::DuplicateKey {
                    source_name: "arguments".to_string(),
                    key: key.to_string(),
                    row,
                });
            }
            entries.push(SampleSheetEntry::new(key, path.as_ref()));
        }
        Ok(Self { entries })
    }

    /// Attaches annotation labels from a parallel list of keys and labels.
    pub fn with_annotations<K, A>(mut self, keys: &[K], labels: &[A]) -> Result<Self, SheetError>
    where
        K: AsRef<str>,
        A: AsRef<str>,
    {
        if keys.len() != labels.len() {
            return Err(SheetError::LengthMismatch {
                keys: keys.len(),
                paths: labels.len(),
            });
        }
        let labels: BTreeMap<&str, &str> = keys
            .iter()
            .map(|k| k.as_ref().trim())
            .zip(labels.iter().map(AsRef::as_ref))
            .collect();
        for entry in &mut self.entries {
            if let Some(label) = labels.get(entry.key.as_str()) {
                entry.annotation = Some((*label).to_string());
            }
        }
        Ok(self)
    }

    /// Entries in row order.
    #[must_use]
    pub fn entries(&self) -> &[SampleSheetEntry] {
        &self.entries
    }

    /// Keys in row order.
    #[must_use]
    pub fn keys(&self) -> Vec<SampleKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    /// Looks up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SampleSheetEntry> {
        self.entries.iter().find(|e| e.key.as_str() == key)
    }

    /// The key to data path table used for table-lookup resolution.
    #[must_use]
    pub fn data_paths(&self) -> BTreeMap<SampleKey, PathBuf> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.data_path.clone()))
            .collect()
    }

    /// Key to annotation label, for entries that have one.
    #[must_use]
    pub fn annotations(&self) -> BTreeMap<SampleKey, String> {
        self.entries
            .iter()
            .filter_map(|e| e.annotation.clone().map(|a| (e.key.clone(), a)))
            .collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the sheet has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
