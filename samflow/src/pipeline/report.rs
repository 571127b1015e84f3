//! Mapping-score tables produced by the report stage.

use crate::errors::{Result, SamflowError};
use crate::store::write_atomic;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// One labelled row of scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// Row label, e.g. `pl_neoblast`.
    pub label: String,
    /// One value per column.
    pub values: Vec<f64>,
}

/// A labelled score matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreTable {
    /// Header of the label column. Empty by default.
    #[serde(default)]
    pub index_name: String,
    /// Column labels.
    pub columns: Vec<String>,
    /// Rows, in output order.
    #[serde(default)]
    pub rows: Vec<ScoreRow>,
}

impl ScoreTable {
    /// Checks that every row has one value per column.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for row in &self.rows {
            if row.values.len() != self.columns.len() {
                return Err(format!(
                    "row '{}' has {} values for {} columns",
                    row.label,
                    row.values.len(),
                    self.columns.len()
                ));
            }
        }
        Ok(())
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(std::iter::once(self.index_name.as_str()).chain(self.columns.iter().map(String::as_str)))?;
        for row in &self.rows {
            let mut record = Vec::with_capacity(row.values.len() + 1);
            record.push(row.label.clone());
            record.extend(row.values.iter().map(ToString::to_string));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Writes the table as CSV to `path`, replacing any existing file.
    ///
    /// The table is rendered in memory first and renamed into place, so a
    /// failed write never leaves a truncated table behind.
    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        self.write_csv(&mut bytes).map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => SamflowError::io("write report table", path, io),
            other => SamflowError::Serialization(format!("{}: {other:?}", path.display())),
        })?;
        write_atomic(path, &bytes, "write report table")
    }
}

/// The two tables the scoring computation returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingScores {
    /// Highest mapping scores between cell types.
    pub hms: ScoreTable,
    /// Pairwise mapping scores.
    pub pms: ScoreTable,
}

impl MappingScores {
    /// Decodes a scoring payload.
    pub fn from_payload(payload: &serde_json::Value) -> std::result::Result<Self, String> {
        let scores: Self = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
        scores.hms.validate().map_err(|e| format!("hms: {e}"))?;
        scores.pms.validate().map_err(|e| format!("pms: {e}"))?;
        Ok(scores)
    }
}
