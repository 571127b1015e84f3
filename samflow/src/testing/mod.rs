//! Testing utilities for samflow workflows.
//!
//! This module provides:
//! - Mock computations
//! - On-disk project fixtures

mod fixtures;
mod mocks;

pub use fixtures::{mapping_scores_payload, read_csv_rows, ProjectFixture, ProjectLayout};
pub use mocks::{
    ChattyComputation, FailingComputation, RecordingComputation, SlowComputation, StaticComputation,
};
