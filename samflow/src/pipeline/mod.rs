//! Stage execution and the workflow built on it.
//!
//! This module provides:
//! - The partial-failure policy for batch operations
//! - The single-stage runner and its state machine
//! - Mapping-score report tables
//! - The load, build, run and report workflow

mod failure_policy;
mod integration_tests;
mod report;
mod runner;
mod workflow;

pub use failure_policy::{BatchOutcome, BatchProcessor, FailurePolicy, FailureRecord};
pub use report::{MappingScores, ScoreRow, ScoreTable};
pub use runner::{
    ExecutedStage, StageInput, StageRequest, StageRun, StageRunner, StageTracker, StageTransition,
};
pub use workflow::{
    BuildRequest, ReportOutcome, ReportRequest, Workflow, DEFAULT_BUILD_NAME, DEFAULT_HMS_NAME,
    DEFAULT_PMS_NAME, DEFAULT_RUN_NAME,
};
