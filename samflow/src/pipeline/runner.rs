//! Single-stage execution.
//!
//! A stage loads its inputs, hands them to an external computation and
//! persists the payload it gets back as a new artifact. The runner drives
//! the [`StageState`] machine for every invocation and refuses illegal
//! transitions.

use crate::core::{SampleKey, StageArtifact, StageKind, StageState};
use crate::errors::{ComputationError, Result, SamflowError};
use crate::logging::{Console, Logger};
use crate::stages::{Computation, ComputationRequest};
use crate::store::{ArtifactName, ArtifactStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// One input of a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageInput {
    /// An artifact on disk, loaded through the store.
    Stored(PathBuf),
    /// An artifact already in memory.
    InMemory(StageArtifact),
}

impl StageInput {
    /// Reference recorded in the output artifact's `sources`.
    #[must_use]
    pub fn reference(&self) -> String {
        match self {
            Self::Stored(path) => path.display().to_string(),
            Self::InMemory(artifact) => format!("memory:{}", artifact.id),
        }
    }
}

/// Everything needed to run one stage.
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// The stage to run.
    pub kind: StageKind,
    /// Inputs, in the order the computation receives them.
    pub inputs: Vec<StageInput>,
    /// Parameters passed through to the computation.
    pub params: serde_json::Value,
    /// The sample, for per-sample stages.
    pub sample: Option<SampleKey>,
    /// Directory the output artifact is written to.
    pub output_dir: PathBuf,
    /// Name of the output artifact.
    pub output_name: ArtifactName,
}

impl StageRequest {
    /// Creates a request with no inputs and null parameters.
    #[must_use]
    pub fn new(kind: StageKind, output_dir: impl Into<PathBuf>, output_name: ArtifactName) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            params: serde_json::Value::Null,
            sample: None,
            output_dir: output_dir.into(),
            output_name,
        }
    }

    /// Adds an input.
    #[must_use]
    pub fn with_input(mut self, input: StageInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Sets the sample key.
    #[must_use]
    pub fn with_sample(mut self, sample: SampleKey) -> Self {
        self.sample = Some(sample);
        self
    }

    /// `load[pl]` for per-sample stages, `build` otherwise.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.sample {
            Some(sample) => format!("{}[{sample}]", self.kind),
            None => self.kind.to_string(),
        }
    }
}

/// A timestamped state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    /// State entered.
    pub state: StageState,
    /// When it was entered (ISO 8601).
    pub at: String,
}

/// Enforces the stage state machine.
#[derive(Debug, Clone)]
pub struct StageTracker {
    stage: String,
    state: StageState,
    history: Vec<StageTransition>,
}

impl StageTracker {
    /// Creates a tracker in `Pending`.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            state: StageState::Pending,
            history: vec![StageTransition {
                state: StageState::Pending,
                at: crate::utils::iso_timestamp(),
            }],
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.state
    }

    /// All states entered so far.
    #[must_use]
    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// [`SamflowError::InvalidTransition`] if the move is not allowed.
    pub fn advance(&mut self, next: StageState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SamflowError::InvalidTransition {
                stage: self.stage.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(StageTransition {
            state: next,
            at: crate::utils::iso_timestamp(),
        });
        Ok(())
    }

    /// Marks the stage failed if it is still working.
    pub fn fail(&mut self) {
        if self.state.is_active() {
            self.state = StageState::Failed;
            self.history.push(StageTransition {
                state: StageState::Failed,
                at: crate::utils::iso_timestamp(),
            });
        }
    }

    fn into_history(self) -> Vec<StageTransition> {
        self.history
    }
}

/// A stage that has executed but not yet been persisted.
#[derive(Debug)]
pub struct ExecutedStage {
    /// The artifact wrapping the computation's payload.
    pub artifact: StageArtifact,
    output_dir: PathBuf,
    output_name: ArtifactName,
    tracker: StageTracker,
    started: Instant,
}

impl ExecutedStage {
    /// The current state, always `Executing`.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.tracker.state()
    }

    /// Directory the artifact would be persisted to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// A completed stage.
#[derive(Debug, Clone)]
pub struct StageRun {
    /// The persisted artifact.
    pub artifact: StageArtifact,
    /// Where the stage's primary output was written.
    pub path: PathBuf,
    /// State history, ending in `Done`.
    pub history: Vec<StageTransition>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

/// Runs stages against an artifact store.
#[derive(Debug, Clone)]
pub struct StageRunner {
    store: ArtifactStore,
    logger: Logger,
    timeout: Option<Duration>,
}

impl StageRunner {
    /// Creates a runner with no timeout.
    #[must_use]
    pub fn new(store: ArtifactStore, logger: Logger) -> Self {
        Self {
            store,
            logger,
            timeout: None,
        }
    }

    /// Bounds every computation by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The logger.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Loads, executes and persists one stage.
    #[tracing::instrument(skip_all, fields(stage = %request.label()))]
    pub async fn run_stage(&self, request: StageRequest, computation: &dyn Computation) -> Result<StageRun> {
        let executed = self.execute_stage(request, computation).await?;
        self.persist_stage(executed)
    }

    /// Loads inputs and runs the computation, stopping before persistence.
    #[tracing::instrument(skip_all, fields(stage = %request.label(), computation = computation.name()))]
    pub async fn execute_stage(
        &self,
        request: StageRequest,
        computation: &dyn Computation,
    ) -> Result<ExecutedStage> {
        let started = Instant::now();
        let label = request.label();
        let mut tracker = StageTracker::new(label.clone());

        tracker.advance(StageState::Loading)?;
        self.logger
            .debug(format!("Loading {} input(s) for {label}", request.inputs.len()));
        let inputs = match self.load_inputs(&request.inputs) {
            Ok(inputs) => inputs,
            Err(err) => return Err(self.fail(&mut tracker, err)),
        };

        tracker.advance(StageState::Executing)?;
        self.logger
            .info(format!("Running {label} with '{}'", computation.name()));
        let computation_request = ComputationRequest {
            stage: request.kind,
            sample: request.sample.clone(),
            inputs,
            params: request.params,
        };
        let console = Console::new(computation.name(), self.logger.clone());
        let result = self.invoke(computation, &computation_request, &console).await;
        console.finish();

        let data = match result {
            Ok(data) => data,
            Err(err) => return Err(self.fail(&mut tracker, err.into())),
        };

        let mut artifact = StageArtifact::new(request.kind, label, self.store.run_id().to_string(), data)
            .with_sources(request.inputs.iter().map(StageInput::reference).collect())
            .with_metadata("computation", serde_json::json!(computation.name()));
        if let Some(sample) = request.sample {
            artifact = artifact.with_sample(sample);
        }

        Ok(ExecutedStage {
            artifact,
            output_dir: request.output_dir,
            output_name: request.output_name,
            tracker,
            started,
        })
    }

    /// Writes an executed stage's artifact through the store.
    pub fn persist_stage(&self, executed: ExecutedStage) -> Result<StageRun> {
        let dir = executed.output_dir.clone();
        let name = executed.output_name.clone();
        self.persist_stage_with(executed, |artifact| {
            std::fs::create_dir_all(&dir)
                .map_err(|e| SamflowError::io("create artifact directory", &dir, e))?;
            let path = self.store.path_for(&dir, &name);
            if let Some(file_name) = path.file_name() {
                artifact.name = file_name.to_string_lossy().into_owned();
            }
            self.store.write_to(&*artifact, &path)?;
            Ok(path)
        })
    }

    /// Finishes an executed stage with a caller-supplied writer.
    ///
    /// `write` receives the artifact and returns the path of the stage's
    /// primary output. Its error fails the stage.
    pub fn persist_stage_with<F>(&self, executed: ExecutedStage, write: F) -> Result<StageRun>
    where
        F: FnOnce(&mut StageArtifact) -> Result<PathBuf>,
    {
        let ExecutedStage {
            mut artifact,
            mut tracker,
            started,
            ..
        } = executed;

        tracker.advance(StageState::Persisting)?;
        let label = artifact.name.clone();

        let path = match write(&mut artifact) {
            Ok(path) => path,
            Err(err) => return Err(self.fail(&mut tracker, err)),
        };
        tracker.advance(StageState::Done)?;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.logger
            .info(format!("Finished {label}; saved output to '{}'", path.display()));
        tracing::debug!(stage = %label, duration_ms, "stage finished");

        Ok(StageRun {
            artifact,
            path,
            history: tracker.into_history(),
            duration_ms,
        })
    }

    fn load_inputs(&self, inputs: &[StageInput]) -> Result<Vec<StageArtifact>> {
        inputs
            .iter()
            .map(|input| match input {
                StageInput::Stored(path) => {
                    self.logger.debug(format!("  Reading '{}'", path.display()));
                    self.store.load_artifact(path).map_err(SamflowError::from)
                }
                StageInput::InMemory(artifact) => Ok(artifact.clone()),
            })
            .collect()
    }

    async fn invoke(
        &self,
        computation: &dyn Computation,
        request: &ComputationRequest,
        console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, computation.execute(request, console))
                .await
                .map_err(|_| ComputationError::TimedOut {
                    computation: computation.name().to_string(),
                    seconds: limit.as_secs_f64(),
                })?,
            None => computation.execute(request, console).await,
        }
    }

    /// Marks the stage failed. The error itself is reported by whoever
    /// decides whether it is fatal.
    fn fail(&self, tracker: &mut StageTracker, err: SamflowError) -> SamflowError {
        let state = tracker.state();
        tracker.fail();
        self.logger
            .debug(format!("Stage {} failed while {state}: {err}", tracker.stage));
        err
    }
}
