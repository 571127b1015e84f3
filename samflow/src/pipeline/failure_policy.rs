//! Partial-failure policy for batch operations over sample keys.
//!
//! Every batch operation takes a [`FailurePolicy`] explicitly; there is no
//! default. Under warn-and-skip a recoverable per-key failure is logged once
//! as a warning and recorded, and the batch continues. Under fail-fast the
//! first failure aborts the batch and is returned unchanged. Failures that
//! are never recoverable (missing directories, external computation
//! failures) abort under both policies.

use crate::core::SampleKey;
use crate::errors::{Result, SamflowError};
use crate::logging::Logger;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a batch reacts to a per-key failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the batch on the first failure.
    FailFast,
    /// Warn, record the failure and continue with the remaining keys.
    WarnAndSkip,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail-fast"),
            Self::WarnAndSkip => write!(f, "warn-and-skip"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = SamflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(Self::FailFast),
            "warn-and-skip" => Ok(Self::WarnAndSkip),
            other => Err(SamflowError::Config(format!(
                "unknown failure policy '{other}' (expected fail-fast or warn-and-skip)"
            ))),
        }
    }
}

/// Record of one skipped key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The key that failed.
    pub key: SampleKey,
    /// The batch operation.
    pub operation: String,
    /// Error taxonomy name.
    pub error_type: String,
    /// Error message.
    pub error: String,
    /// When the failure was recorded (ISO 8601).
    pub timestamp: String,
}

impl FailureRecord {
    /// Creates a record from an error.
    #[must_use]
    pub fn new(key: SampleKey, operation: impl Into<String>, error: &SamflowError) -> Self {
        Self {
            key,
            operation: operation.into(),
            error_type: error.kind().to_string(),
            error: error.to_string(),
            timestamp: crate::utils::iso_timestamp(),
        }
    }
}

/// Result of a batch: successes keyed by sample, failures sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// Successful results.
    pub resolved: BTreeMap<SampleKey, T>,
    /// Skipped keys, sorted by key.
    pub failures: Vec<FailureRecord>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            resolved: BTreeMap::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Returns true if no key was skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Keys that were skipped, in key order.
    #[must_use]
    pub fn skipped_keys(&self) -> Vec<&SampleKey> {
        self.failures.iter().map(|f| &f.key).collect()
    }

    /// Total number of keys processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.resolved.len() + self.failures.len()
    }
}

/// Applies a [`FailurePolicy`] to per-key work.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    operation: String,
    policy: FailurePolicy,
    logger: Logger,
}

impl BatchProcessor {
    /// Creates a processor for the named operation.
    #[must_use]
    pub fn new(operation: impl Into<String>, policy: FailurePolicy, logger: Logger) -> Self {
        Self {
            operation: operation.into(),
            policy,
            logger,
        }
    }

    /// The policy in effect.
    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Processes keys one at a time, in the order given.
    ///
    /// Under fail-fast, processing stops at the first failure.
    pub fn run<T, F>(&self, keys: &[SampleKey], mut f: F) -> Result<BatchOutcome<T>>
    where
        F: FnMut(&SampleKey) -> Result<T>,
    {
        let mut outcome = BatchOutcome::default();
        for key in self.unique_keys(keys) {
            match f(&key) {
                Ok(value) => {
                    outcome.resolved.insert(key, value);
                }
                Err(err) => self.absorb(key, err, &mut outcome)?,
            }
        }
        Ok(self.finish(outcome))
    }

    /// Processes keys on a bounded worker pool.
    ///
    /// Once a failure that aborts the batch has been seen, no further key
    /// is started. Work already in flight runs to completion. Results are
    /// then applied in key order, so under fail-fast the reported failure
    /// is the smallest failing key among those that ran. With one worker
    /// this is the first failure in the order given.
    pub async fn run_concurrent<T, F, Fut>(
        &self,
        keys: &[SampleKey],
        max_workers: usize,
        f: F,
    ) -> Result<BatchOutcome<T>>
    where
        F: Fn(SampleKey) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let aborted = AtomicBool::new(false);
        let (f, aborted_ref) = (&f, &aborted);

        let mut results: Vec<(SampleKey, Result<T>)> = stream::iter(self.unique_keys(keys))
            .map(|key| {
                // Decided when the pool pulls the key, not when it is first polled.
                let start = !aborted_ref.load(Ordering::SeqCst);
                async move {
                    if !start {
                        return None;
                    }
                    let result = f(key.clone()).await;
                    if let Err(err) = &result {
                        if self.aborts(err) {
                            aborted_ref.store(true, Ordering::SeqCst);
                        }
                    }
                    Some((key, result))
                }
            })
            .buffer_unordered(max_workers.max(1))
            .filter_map(|done| async move { done })
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outcome = BatchOutcome::default();
        for (key, result) in results {
            match result {
                Ok(value) => {
                    outcome.resolved.insert(key, value);
                }
                Err(err) => self.absorb(key, err, &mut outcome)?,
            }
        }
        Ok(self.finish(outcome))
    }

    fn unique_keys(&self, keys: &[SampleKey]) -> Vec<SampleKey> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if seen.insert(key) {
                unique.push(key.clone());
            } else {
                self.logger
                    .warn(format!("  Sample '{key}' listed more than once for {}; processing it once", self.operation));
            }
        }
        unique
    }

    /// Returns true if `err` ends the batch under this policy.
    fn aborts(&self, err: &SamflowError) -> bool {
        !(self.policy == FailurePolicy::WarnAndSkip && err.is_recoverable())
    }

    /// Records a skippable failure or hands the error back to abort.
    fn absorb<T>(&self, key: SampleKey, err: SamflowError, outcome: &mut BatchOutcome<T>) -> Result<()> {
        if !self.aborts(&err) {
            self.logger
                .warn(format!("  Skipping '{key}' during {}: {err}", self.operation));
            outcome.failures.push(FailureRecord::new(key, &self.operation, &err));
            Ok(())
        } else {
            Err(err)
        }
    }

    fn finish<T>(&self, mut outcome: BatchOutcome<T>) -> BatchOutcome<T> {
        outcome.failures.sort_by(|a, b| a.key.cmp(&b.key));
        if !outcome.is_complete() {
            self.logger.info(format!(
                "{} completed for {} of {} samples",
                self.operation,
                outcome.resolved.len(),
                outcome.total()
            ));
        }
        outcome
    }
}
