//! The four workflow stages: load, build, run and report.

use super::failure_policy::{BatchOutcome, BatchProcessor, FailurePolicy};
use super::report::MappingScores;
use super::runner::{StageInput, StageRequest, StageRun, StageRunner};
use crate::config::PipelineConfig;
use crate::core::{OutputManifest, SampleKey, StageKind};
use crate::errors::{ArtifactError, ArtifactFault, ComputationError, Result, SamflowError};
use crate::logging::Logger;
use crate::resolve::{IdentifierResolver, SearchRoot};
use crate::sheet::SampleSheet;
use crate::stages::Computation;
use crate::store::{ArtifactName, ArtifactStore};
use crate::utils::{list_files_with_extension, validate_dir, RunId};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default name of the assembled alignment object.
pub const DEFAULT_BUILD_NAME: &str = "samap";
/// Default name of the alignment results.
pub const DEFAULT_RUN_NAME: &str = "samap_results";
/// Default base name of the highest-mapping-score table.
pub const DEFAULT_HMS_NAME: &str = "hms";
/// Default base name of the pairwise-mapping-score table.
pub const DEFAULT_PMS_NAME: &str = "pms";

/// Inputs of the build stage.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Directory holding per-sample artifacts from the load stage.
    pub sams_dir: PathBuf,
    /// Samples to assemble.
    pub keys: Vec<SampleKey>,
    /// Directory of mapping tables between samples.
    pub maps_dir: PathBuf,
    /// Where the assembled object is written.
    pub output_dir: PathBuf,
    /// Name of the assembled object.
    pub output_name: ArtifactName,
    /// What to do when a sample's artifact cannot be found.
    pub policy: FailurePolicy,
}

impl BuildRequest {
    /// Creates a request writing `samap` into `output_dir`.
    #[must_use]
    pub fn new(
        sams_dir: impl Into<PathBuf>,
        keys: Vec<SampleKey>,
        maps_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            sams_dir: sams_dir.into(),
            keys,
            maps_dir: maps_dir.into(),
            output_dir: output_dir.into(),
            output_name: ArtifactName::fixed(DEFAULT_BUILD_NAME),
            policy,
        }
    }

    /// Overrides the output name.
    #[must_use]
    pub fn with_output_name(mut self, name: ArtifactName) -> Self {
        self.output_name = name;
        self
    }
}

/// Inputs of the report stage.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    /// The alignment results artifact.
    pub input: PathBuf,
    /// Where tables and the manifest are written.
    pub output_dir: PathBuf,
    /// Annotation label per sample, passed to the scoring computation.
    pub annotations: BTreeMap<SampleKey, String>,
    /// Number of top cells per cell type used for scoring; 0 means all.
    pub n_top: usize,
    /// Base name of the highest-mapping-score table.
    pub hms_name: String,
    /// Base name of the pairwise-mapping-score table.
    pub pms_name: String,
    /// What to do when a table cannot be written.
    pub policy: FailurePolicy,
}

impl ReportRequest {
    /// Creates a request with default table names and `n_top = 0`.
    #[must_use]
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        annotations: BTreeMap<SampleKey, String>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            annotations,
            n_top: 0,
            hms_name: DEFAULT_HMS_NAME.to_string(),
            pms_name: DEFAULT_PMS_NAME.to_string(),
            policy,
        }
    }

    /// Sets `n_top`.
    #[must_use]
    pub fn with_n_top(mut self, n_top: usize) -> Self {
        self.n_top = n_top;
        self
    }

    /// Overrides the table names.
    #[must_use]
    pub fn with_table_names(mut self, hms: impl Into<String>, pms: impl Into<String>) -> Self {
        self.hms_name = hms.into();
        self.pms_name = pms.into();
        self
    }
}

/// What the report stage wrote.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The stage run; `path` is the manifest.
    pub run: StageRun,
    /// Outputs that were written.
    pub manifest: OutputManifest,
    /// Outputs skipped under warn-and-skip.
    pub skipped: Vec<String>,
}

/// Wires resolution, execution and persistence into the workflow stages.
#[derive(Debug, Clone)]
pub struct Workflow {
    runner: StageRunner,
    workers: usize,
    min_assembly_samples: usize,
}

impl Workflow {
    /// Creates a workflow around an existing runner.
    #[must_use]
    pub fn new(runner: StageRunner, config: &PipelineConfig) -> Self {
        Self {
            runner,
            workers: config.workers.max(1),
            min_assembly_samples: config.min_assembly_samples,
        }
    }

    /// Creates a workflow for a new run.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, logger: Logger, run_id: RunId) -> Self {
        let store = ArtifactStore::new(run_id, config.artifact_extension.clone());
        let runner = StageRunner::new(store, logger).with_timeout(config.stage_timeout());
        Self::new(runner, config)
    }

    /// The stage runner.
    #[must_use]
    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    fn logger(&self) -> &Logger {
        self.runner.logger()
    }

    /// Loads every sample in the sheet into `<key>_sam` artifacts.
    ///
    /// Artifacts are written to a staging directory inside `output_dir` and
    /// moved into place only when the batch succeeds. An aborted batch
    /// leaves `output_dir` exactly as it was, including artifacts from
    /// earlier runs.
    pub async fn load_samples(
        &self,
        sheet: &SampleSheet,
        computation: &dyn Computation,
        output_dir: &Path,
        policy: FailurePolicy,
    ) -> Result<BatchOutcome<PathBuf>> {
        let resolver = IdentifierResolver::new(SearchRoot::Table(sheet.data_paths()));
        let staging = output_dir.join(format!(".staging-{}", self.runner.store().run_id().short()));
        let batch = BatchProcessor::new("load", policy, self.logger().clone());

        let (resolver, staging_ref) = (&resolver, &staging);
        let result = batch
            .run_concurrent(&sheet.keys(), self.workers, move |key| async move {
                let data_path = resolver.resolve(&key)?;
                if !data_path.is_file() {
                    return Err(SamflowError::from(ArtifactError::new(&data_path, ArtifactFault::Missing)));
                }
                self.logger()
                    .info(format!("Loading sample '{key}' from '{}'", data_path.display()));

                let request = StageRequest::new(
                    StageKind::Load,
                    staging_ref,
                    ArtifactName::for_sample(&key, StageKind::Load),
                )
                .with_params(json!({"key": key, "data_path": data_path}))
                .with_sample(key);
                let run = self.runner.run_stage(request, computation).await?;
                Ok::<PathBuf, SamflowError>(run.path)
            })
            .await;

        let outcome = match result {
            Ok(outcome) => self.promote(outcome, output_dir),
            Err(err) => {
                let discarded = std::fs::read_dir(&staging).map_or(0, Iterator::count);
                if discarded > 0 {
                    self.logger().info(format!(
                        "Discarded {discarded} sample artifact(s) written before the load was aborted"
                    ));
                }
                Err(err)
            }
        };
        if let Err(e) = std::fs::remove_dir_all(&staging) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.logger()
                    .debug(format!("Could not remove '{}': {e}", staging.display()));
            }
        }
        outcome
    }

    /// Moves staged artifacts into `output_dir`, replacing earlier ones.
    fn promote(&self, outcome: BatchOutcome<PathBuf>, output_dir: &Path) -> Result<BatchOutcome<PathBuf>> {
        let mut resolved = BTreeMap::new();
        for (key, staged) in outcome.resolved {
            let Some(file_name) = staged.file_name() else {
                continue;
            };
            let target = output_dir.join(file_name);
            std::fs::rename(&staged, &target).map_err(|e| SamflowError::io("move sample artifact", &target, e))?;
            self.logger()
                .debug(format!("  Saved '{key}' to '{}'", target.display()));
            resolved.insert(key, target);
        }
        Ok(BatchOutcome {
            resolved,
            failures: outcome.failures,
        })
    }

    /// Assembles loaded samples and mapping tables into one object.
    pub async fn build(&self, request: BuildRequest, computation: &dyn Computation) -> Result<StageRun> {
        let logger = self.logger();

        logger.info("Ensuring validity of maps directory");
        let maps_dir = validate_dir(&request.maps_dir, "build")?;
        if maps_dir.as_str() != request.maps_dir.to_string_lossy() {
            logger.info(format!(
                "Using '{maps_dir}' for maps directory '{}'",
                request.maps_dir.display()
            ));
        }
        let tables = list_files_with_extension(maps_dir.as_path(), "txt")?;
        if tables.is_empty() {
            logger.warn(format!("No mapping tables (*.txt) found in '{maps_dir}'"));
        }
        for table in &tables {
            logger.debug(format!("  Found mapping table '{}'", table.display()));
        }

        let sams_dir = validate_dir(&request.sams_dir, "build")?;
        let resolver = IdentifierResolver::new(SearchRoot::directory(
            sams_dir.as_path(),
            Some(self.runner.store().extension()),
        ));
        let outcome = resolver.resolve_all(&request.keys, request.policy, logger)?;
        if outcome.resolved.len() < self.min_assembly_samples {
            return Err(SamflowError::InsufficientSamples {
                operation: "build".to_string(),
                found: outcome.resolved.len(),
                required: self.min_assembly_samples,
            });
        }

        logger.info(format!("Building alignment object from {} samples", outcome.resolved.len()));
        let samples: BTreeMap<&str, String> = outcome
            .resolved
            .iter()
            .map(|(key, path)| (key.as_str(), path.display().to_string()))
            .collect();
        let mut stage = StageRequest::new(StageKind::Build, &request.output_dir, request.output_name.clone())
            .with_params(json!({"maps_dir": maps_dir.as_str(), "samples": samples}));
        for path in outcome.resolved.values() {
            stage = stage.with_input(StageInput::Stored(path.clone()));
        }
        self.runner.run_stage(stage, computation).await
    }

    /// Runs the alignment on an assembled object.
    pub async fn run_alignment(
        &self,
        input: &Path,
        output_dir: &Path,
        output_name: ArtifactName,
        computation: &dyn Computation,
    ) -> Result<StageRun> {
        self.logger()
            .info(format!("Running alignment on '{}'", input.display()));
        let stage = StageRequest::new(StageKind::Run, output_dir, output_name)
            .with_input(StageInput::Stored(input.to_path_buf()));
        self.runner.run_stage(stage, computation).await
    }

    /// Scores an alignment and writes the score tables plus a manifest.
    pub async fn report(&self, request: ReportRequest, computation: &dyn Computation) -> Result<ReportOutcome> {
        let logger = self.logger();
        let output_dir = &request.output_dir;

        if output_dir.is_dir() {
            logger.info(format!("Output directory '{}' already exists", output_dir.display()));
        } else {
            std::fs::create_dir_all(output_dir)
                .map_err(|e| SamflowError::io("create output directory", output_dir, e))?;
            logger.info(format!("Created output directory '{}'", output_dir.display()));
        }

        let stage = StageRequest::new(StageKind::Report, output_dir, ArtifactName::unique("scores"))
            .with_input(StageInput::Stored(request.input.clone()))
            .with_params(json!({"keys": request.annotations, "n_top": request.n_top}));
        let executed = self.runner.execute_stage(stage, computation).await?;

        let store = self.runner.store();
        let mut manifest = OutputManifest::new(store.run_id().to_string(), StageKind::Report, &request.input);
        let mut skipped = Vec::new();
        let run = self.runner.persist_stage_with(executed, |artifact| {
            let scores = MappingScores::from_payload(&artifact.data)
                .map_err(|reason| ComputationError::malformed(computation.name(), reason))?;

            for (name, table) in [(&request.hms_name, &scores.hms), (&request.pms_name, &scores.pms)] {
                let path = output_dir.join(format!("{name}.csv"));
                logger.info(format!("Writing '{name}' table to '{}'", path.display()));
                match table.write_csv_file(&path) {
                    Ok(()) => manifest.record(name.clone(), path)?,
                    Err(err) if request.policy == FailurePolicy::WarnAndSkip => {
                        logger.warn(format!("  Skipping output '{name}': {err}"));
                        skipped.push(name.clone());
                    }
                    Err(err) => return Err(err),
                }
            }

            store.store(&manifest, output_dir, &ArtifactName::unique("manifest"))
        })?;

        Ok(ReportOutcome { run, manifest, skipped })
    }
}
