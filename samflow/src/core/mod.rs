//! Core domain model types for samflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Sample keys and sample sheet rows
//! - Stage kind and state enums
//! - Stage artifacts and output manifests

mod artifact;
mod manifest;
mod sample;
mod status;

pub use artifact::{StageArtifact, ARTIFACT_FORMAT_VERSION};
pub use manifest::OutputManifest;
pub use sample::{SampleKey, SampleSheetEntry};
pub use status::{StageKind, StageState};
