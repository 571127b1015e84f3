//! Output manifest written at the end of the report stage.

use super::StageKind;
use crate::errors::ManifestConflictError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Records which files a stage wrote and which artifact they came from.
///
/// Outputs can only be added, never replaced. The manifest exists for
/// traceability and is never consulted for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    /// The run that wrote the outputs.
    pub run_id: String,
    /// The stage that wrote the outputs.
    pub stage: StageKind,
    /// Reference to the artifact the outputs were derived from.
    pub input_artifact: PathBuf,
    /// Named output files.
    pub outputs: BTreeMap<String, PathBuf>,
    /// When the manifest was created (ISO 8601).
    pub created_at: String,
}

impl OutputManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new(run_id: impl Into<String>, stage: StageKind, input_artifact: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            stage,
            input_artifact: input_artifact.into(),
            outputs: BTreeMap::new(),
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Records a named output.
    pub fn record(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<(), ManifestConflictError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(ManifestConflictError::new(name));
        }
        self.outputs.insert(name, path.into());
        Ok(())
    }

    /// Returns the path recorded under `name`.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Path> {
        self.outputs.get(name).map(PathBuf::as_path)
    }

    /// Returns the number of recorded outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
