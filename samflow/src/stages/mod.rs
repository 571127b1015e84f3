//! External computations invoked by pipeline stages.
//!
//! The orchestrator never interprets biological data itself. Every stage
//! hands a [`ComputationRequest`] to an implementation of [`Computation`]
//! and stores whatever JSON payload comes back.

mod command;

pub use command::{CommandComputation, RESULT_PATH_ENV, STAGE_ENV};

use crate::core::{SampleKey, StageArtifact, StageKind};
use crate::errors::ComputationError;
use crate::logging::Console;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Everything a computation receives for one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationRequest {
    /// The stage being executed.
    pub stage: StageKind,
    /// The sample, for per-sample stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<SampleKey>,
    /// Loaded input artifacts, in request order.
    #[serde(default)]
    pub inputs: Vec<StageArtifact>,
    /// Stage parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ComputationRequest {
    /// Creates a request with no inputs and null parameters.
    #[must_use]
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            sample: None,
            inputs: Vec::new(),
            params: serde_json::Value::Null,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Adds an input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: StageArtifact) -> Self {
        self.inputs.push(artifact);
        self
    }

    /// Looks up a string parameter.
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(serde_json::Value::as_str)
    }
}

/// An opaque unit of work executed on behalf of a stage.
///
/// Implementations must route any text they produce through the supplied
/// [`Console`] rather than writing to the terminal.
#[async_trait]
pub trait Computation: Send + Sync + Debug {
    /// Returns the name used in logs and errors.
    fn name(&self) -> &str;

    /// Executes the computation.
    async fn execute(
        &self,
        request: &ComputationRequest,
        console: &Console,
    ) -> Result<serde_json::Value, ComputationError>;
}

/// A closure-backed computation.
pub struct FnComputation<F>
where
    F: Fn(&ComputationRequest, &Console) -> Result<serde_json::Value, ComputationError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnComputation<F>
where
    F: Fn(&ComputationRequest, &Console) -> Result<serde_json::Value, ComputationError> + Send + Sync,
{
    /// Creates a new function-based computation.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnComputation<F>
where
    F: Fn(&ComputationRequest, &Console) -> Result<serde_json::Value, ComputationError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComputation")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Computation for FnComputation<F>
where
    F: Fn(&ComputationRequest, &Console) -> Result<serde_json::Value, ComputationError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        (self.func)(request, console)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CollectingLogSink, LogLevel, Logger};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_computation() {
        let computation = FnComputation::new("echo", |request, console| {
            console.line("echoing params");
            Ok(request.params.clone())
        });
        assert_eq!(computation.name(), "echo");

        let sink = Arc::new(CollectingLogSink::new());
        let console = Console::new("echo", Logger::new(LogLevel::Debug, sink.clone()));
        let request = ComputationRequest::new(StageKind::Run).with_params(json!({"n": 3}));

        let value = computation.execute(&request, &console).await.unwrap();
        assert_eq!(value, json!({"n": 3}));
        assert_eq!(sink.messages_at(LogLevel::Info), vec!["[echo] echoing params".to_string()]);
    }

    #[test]
    fn test_request_serializes_without_sample() {
        let request = ComputationRequest::new(StageKind::Build).with_params(json!({"maps_dir": "maps/"}));
        let encoded = serde_json::to_value(&request).unwrap();

        assert_eq!(encoded["stage"], json!("build"));
        assert!(encoded.get("sample").is_none());
        assert_eq!(request.param_str("maps_dir"), Some("maps/"));
    }
}
