//! Stage artifact type.

use super::{SampleKey, StageKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest artifact format version this build writes and reads.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// The serialized output of one pipeline stage.
///
/// The orchestrator treats `data` as opaque: only the computation that
/// produced it and the downstream computation that consumes it interpret
/// the payload. Artifacts are written once and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    /// Artifact format version.
    pub format_version: u32,

    /// The stage that produced the artifact.
    pub kind: StageKind,

    /// A unique identifier for the artifact.
    pub id: String,

    /// Human readable name (usually the stored file name).
    pub name: String,

    /// The run that produced the artifact.
    pub run_id: String,

    /// The sample this artifact describes, for per-sample stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<SampleKey>,

    /// References to the inputs this artifact was derived from.
    #[serde(default)]
    pub sources: Vec<String>,

    /// The opaque payload.
    pub data: serde_json::Value,

    /// Additional metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// When the artifact was created (ISO 8601).
    pub created_at: String,
}

impl StageArtifact {
    /// Creates a new stage artifact.
    #[must_use]
    pub fn new(
        kind: StageKind,
        name: impl Into<String>,
        run_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            kind,
            id: crate::utils::generate_uuid().to_string(),
            name: name.into(),
            run_id: run_id.into(),
            sample: None,
            sources: Vec::new(),
            data,
            metadata: HashMap::new(),
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Sets the sample key.
    #[must_use]
    pub fn with_sample(mut self, sample: SampleKey) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Sets the input references.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if this build can interpret the artifact's format.
    #[must_use]
    pub fn is_supported_version(&self) -> bool {
        self.format_version <= ARTIFACT_FORMAT_VERSION
    }
}
