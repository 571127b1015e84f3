//! # Samflow
//!
//! Staged orchestration for cross-species single-cell alignment workflows.
//!
//! Samflow drives an alignment through four stages, each of which can be
//! run on its own and resumed from the artifacts of the previous one:
//!
//! - **load**: turn each sample's raw data file into a per-sample artifact
//! - **build**: assemble loaded samples and mapping tables into one object
//! - **run**: execute the alignment
//! - **report**: score the alignment and write CSV tables plus a manifest
//!
//! The numerical work is delegated to external [`stages::Computation`]s.
//! Samflow resolves sample identifiers to files, validates directories,
//! persists artifacts, applies an explicit partial-failure policy and
//! narrates everything through an injectable [`logging::Logger`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use samflow::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let workflow = Workflow::from_config(&config, Logger::stderr(LogLevel::Info), RunId::new());
//!
//! let request = BuildRequest::new("sams/", keys, "maps/", "out/", FailurePolicy::FailFast);
//! let run = workflow.build(request, &assemble).await?;
//! println!("assembled object at {}", run.path.display());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod resolve;
pub mod sheet;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::core::{OutputManifest, SampleKey, StageArtifact, StageKind, StageState};
    pub use crate::errors::{ComputationError, Result, SamflowError};
    pub use crate::logging::{Console, LogLevel, Logger};
    pub use crate::pipeline::{
        BatchOutcome, BuildRequest, FailurePolicy, ReportRequest, StageInput, StageRequest,
        StageRunner, Workflow,
    };
    pub use crate::resolve::{IdentifierResolver, SearchRoot};
    pub use crate::sheet::{SampleSheet, SheetColumns};
    pub use crate::stages::{CommandComputation, Computation, ComputationRequest, FnComputation};
    pub use crate::store::{ArtifactName, ArtifactStore};
    pub use crate::utils::{normalize_dir, validate_dir, RunId};
}
