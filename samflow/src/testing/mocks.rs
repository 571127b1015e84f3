//! Mock computations for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::errors::ComputationError;
use crate::logging::Console;
use crate::stages::{Computation, ComputationRequest};

/// A computation that records every request and returns a fixed payload.
#[derive(Debug)]
pub struct RecordingComputation {
    name: String,
    output: Mutex<serde_json::Value>,
    requests: Mutex<Vec<ComputationRequest>>,
}

impl RecordingComputation {
    /// Creates a recording computation returning an empty object.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(serde_json::json!({})),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the payload to return.
    pub fn set_output(&self, output: serde_json::Value) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the computation ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every request received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<ComputationRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<ComputationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Computation for RecordingComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        _console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        self.requests.lock().push(request.clone());
        Ok(self.output.lock().clone())
    }
}

/// A computation that always returns the same payload.
#[derive(Debug, Clone)]
pub struct StaticComputation {
    name: String,
    output: serde_json::Value,
}

impl StaticComputation {
    /// Creates a static computation.
    #[must_use]
    pub fn new(name: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }
}

#[async_trait]
impl Computation for StaticComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _request: &ComputationRequest,
        _console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        Ok(self.output.clone())
    }
}

/// A computation that always fails, optionally only for some samples.
#[derive(Debug, Clone)]
pub struct FailingComputation {
    name: String,
    reason: String,
    only_samples: Vec<String>,
}

impl FailingComputation {
    /// Creates a computation failing every request.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            only_samples: Vec::new(),
        }
    }

    /// Restricts failures to the given samples; others echo their params.
    #[must_use]
    pub fn for_samples<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_samples = samples.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Computation for FailingComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        _console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        let targeted = self.only_samples.is_empty()
            || request
                .sample
                .as_ref()
                .is_some_and(|s| self.only_samples.iter().any(|o| o == s.as_str()));
        if targeted {
            Err(ComputationError::failed(&self.name, &self.reason))
        } else {
            Ok(request.params.clone())
        }
    }
}

/// A computation that prints progress through its console.
#[derive(Debug, Clone)]
pub struct ChattyComputation {
    name: String,
    lines: Vec<String>,
}

impl ChattyComputation {
    /// Creates a computation printing `lines` and returning its params.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Computation for ChattyComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        for line in &self.lines {
            console.write(line);
            console.write("\n");
        }
        Ok(request.params.clone())
    }
}

/// A computation that sleeps before answering.
#[derive(Debug, Clone)]
pub struct SlowComputation {
    name: String,
    delay: Duration,
}

impl SlowComputation {
    /// Creates a slow computation.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Computation for SlowComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        _console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        tokio::time::sleep(self.delay).await;
        Ok(request.params.clone())
    }
}
