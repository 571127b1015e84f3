//! CLI: run one samflow stage.
//!
//! Every stage delegates its computation to an external program given with
//! `--exec`. The program receives the stage request as JSON on stdin and
//! writes its JSON result to the path in `SAMFLOW_RESULT_PATH`.
//!
//! Usage: `samflow [OPTIONS] <load|build|run|report> [STAGE OPTIONS]`
//!
//! Set RUST_LOG=samflow=debug for internal tracing spans.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use samflow::config::PipelineConfig;
use samflow::core::SampleKey;
use samflow::errors::SheetError;
use samflow::logging::{LogLevel, Logger};
use samflow::pipeline::{
    BuildRequest, FailurePolicy, ReportRequest, Workflow, DEFAULT_BUILD_NAME, DEFAULT_HMS_NAME,
    DEFAULT_PMS_NAME, DEFAULT_RUN_NAME,
};
use samflow::sheet::SampleSheet;
use samflow::stages::CommandComputation;
use samflow::store::ArtifactName;
use samflow::utils::RunId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Staged orchestration for cross-species single-cell alignment.
#[derive(Parser, Debug)]
#[command(name = "samflow", version)]
#[command(
    after_help = r#"Environment variables (override the config file, overridden by flags):
  SAMFLOW_LOG_LEVEL      DEBUG, INFO, WARNING or ERROR
  SAMFLOW_WORKERS        Concurrent per-sample computations
  SAMFLOW_STAGE_TIMEOUT  Seconds before a computation is abandoned

Examples:
  samflow load --sheet samples.csv --output-dir sams/ --exec ./load_sam.py
  samflow build --sheet samples.csv --sams-dir sams/ --maps maps/ --output-dir out/ --exec ./build.py
  samflow run --input out/samap.json --output-dir out/ --exec ./align.py
  samflow report --input out/samap_results.json --sheet samples.csv --output-dir report/ --exec ./score.py"#
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Minimum log level
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Concurrent per-sample computations
    #[arg(long, global = true, value_name = "N")]
    workers: Option<usize>,

    /// Seconds before a computation is abandoned
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load each sample's raw data into a per-sample artifact
    Load {
        #[command(flatten)]
        samples: SampleArgs,
        /// Directory for `<key>_sam` artifacts
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Reaction to a sample that cannot be loaded
        #[arg(long, default_value_t = FailurePolicy::FailFast)]
        policy: FailurePolicy,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Assemble loaded samples and mapping tables into one object
    Build {
        #[command(flatten)]
        samples: SampleArgs,
        /// Directory holding `<key>_sam` artifacts
        #[arg(long, value_name = "DIR")]
        sams_dir: PathBuf,
        /// Directory of mapping tables
        #[arg(long, value_name = "DIR")]
        maps: PathBuf,
        /// Directory for the assembled object
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Output name
        #[arg(long, default_value = DEFAULT_BUILD_NAME)]
        name: String,
        /// Make the output name unique to this run
        #[arg(long)]
        unique_name: bool,
        /// Reaction to a sample whose artifact is missing
        #[arg(long, default_value_t = FailurePolicy::FailFast)]
        policy: FailurePolicy,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Run the alignment on an assembled object
    Run {
        /// The assembled object
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Directory for the results
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Output name
        #[arg(long, default_value = DEFAULT_RUN_NAME)]
        name: String,
        /// Make the output name unique to this run
        #[arg(long)]
        unique_name: bool,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Score an alignment and write report tables
    Report {
        /// The alignment results
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Sample sheet providing the annotation column
        #[arg(long, value_name = "FILE")]
        sheet: Option<PathBuf>,
        /// Sample keys, paired with --annotation
        #[arg(long, num_args = 1.., value_name = "KEY")]
        id2: Vec<String>,
        /// Annotation labels, paired with --id2
        #[arg(long, num_args = 1.., value_name = "LABEL")]
        annotation: Vec<String>,
        /// Directory for tables and the manifest
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
        /// Top cells per cell type used for scoring; 0 uses all
        #[arg(long, default_value_t = 0)]
        n_top: usize,
        /// Base name of the highest-mapping-score table
        #[arg(long, default_value = DEFAULT_HMS_NAME)]
        hms_name: String,
        /// Base name of the pairwise-mapping-score table
        #[arg(long, default_value = DEFAULT_PMS_NAME)]
        pms_name: String,
        /// Reaction to a table that cannot be written
        #[arg(long, default_value_t = FailurePolicy::WarnAndSkip)]
        policy: FailurePolicy,
        #[command(flatten)]
        exec: ExecArgs,
    },
}

/// Where sample keys and data paths come from.
#[derive(Args, Debug)]
struct SampleArgs {
    /// Sample sheet (CSV)
    #[arg(long, value_name = "FILE")]
    sheet: Option<PathBuf>,
    /// Sample keys, paired with --h5ad
    #[arg(long, num_args = 1.., value_name = "KEY")]
    id2: Vec<String>,
    /// Raw data files, paired with --id2
    #[arg(long, num_args = 1.., value_name = "FILE")]
    h5ad: Vec<PathBuf>,
}

impl SampleArgs {
    fn sheet(&self, config: &PipelineConfig) -> anyhow::Result<SampleSheet> {
        if let Some(path) = &self.sheet {
            return Ok(SampleSheet::from_path(path, &config.sheet_columns)?);
        }
        if self.id2.is_empty() {
            bail!("either --sheet or --id2 is required");
        }
        Ok(SampleSheet::from_pairs(&self.id2, &self.h5ad)?)
    }

    fn keys(&self, config: &PipelineConfig) -> anyhow::Result<Vec<SampleKey>> {
        if self.sheet.is_none() && self.h5ad.is_empty() {
            return parse_keys(&self.id2);
        }
        Ok(self.sheet(config)?.keys())
    }
}

/// The external program implementing a stage.
#[derive(Args, Debug)]
struct ExecArgs {
    /// Program implementing the stage computation
    #[arg(long, value_name = "PROGRAM")]
    exec: PathBuf,
    /// Argument passed to the program (repeatable)
    #[arg(long = "exec-arg", value_name = "ARG", allow_hyphen_values = true)]
    exec_args: Vec<String>,
}

impl ExecArgs {
    fn computation(&self, name: &str) -> CommandComputation {
        CommandComputation::new(name, &self.exec).with_args(self.exec_args.iter().cloned())
    }
}

fn parse_keys(raw: &[String]) -> anyhow::Result<Vec<SampleKey>> {
    if raw.is_empty() {
        bail!("either --sheet or --id2 is required");
    }
    raw.iter()
        .enumerate()
        .map(|(i, k)| {
            SampleKey::new(k).with_context(|| format!("sample key #{} is empty", i + 1))
        })
        .collect()
}

fn output_name(name: String, unique: bool) -> ArtifactName {
    if unique {
        ArtifactName::Unique(name)
    } else {
        ArtifactName::Fixed(name)
    }
}

fn annotations(
    sheet: Option<&PathBuf>,
    keys: &[String],
    labels: &[String],
    config: &PipelineConfig,
) -> anyhow::Result<BTreeMap<SampleKey, String>> {
    if let Some(path) = sheet {
        return Ok(SampleSheet::from_path(path, &config.sheet_columns)?.annotations());
    }
    if keys.len() != labels.len() {
        return Err(SheetError::LengthMismatch {
            keys: keys.len(),
            paths: labels.len(),
        }
        .into());
    }
    Ok(parse_keys(keys)?.into_iter().zip(labels.iter().cloned()).collect())
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    }
    .with_env()?;

    if let Some(level) = cli.log_level {
        config = config.with_log_level(level);
    }
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if cli.timeout.is_some() {
        config = config.with_stage_timeout(cli.timeout);
    }
    config.validate()?;
    Ok(config)
}

async fn execute(command: Command, config: &PipelineConfig, logger: &Logger) -> anyhow::Result<()> {
    let run_id = RunId::new();
    logger.debug(format!("Run {run_id} started"));
    let workflow = Workflow::from_config(config, logger.clone(), run_id);

    match command {
        Command::Load {
            samples,
            output_dir,
            policy,
            exec,
        } => {
            let sheet = samples.sheet(config)?;
            let outcome = workflow
                .load_samples(&sheet, &exec.computation("load"), &output_dir, policy)
                .await?;
            logger.info(format!(
                "Loaded {} of {} samples into '{}'",
                outcome.resolved.len(),
                sheet.len(),
                output_dir.display()
            ));
        }
        Command::Build {
            samples,
            sams_dir,
            maps,
            output_dir,
            name,
            unique_name,
            policy,
            exec,
        } => {
            let keys = samples.keys(config)?;
            let request = BuildRequest::new(sams_dir, keys, maps, output_dir, policy)
                .with_output_name(output_name(name, unique_name));
            let run = workflow.build(request, &exec.computation("build")).await?;
            logger.info(format!("Saved alignment object to '{}'", run.path.display()));
        }
        Command::Run {
            input,
            output_dir,
            name,
            unique_name,
            exec,
        } => {
            let run = workflow
                .run_alignment(&input, &output_dir, output_name(name, unique_name), &exec.computation("run"))
                .await?;
            logger.info(format!("Saved alignment results to '{}'", run.path.display()));
        }
        Command::Report {
            input,
            sheet,
            id2,
            annotation,
            output_dir,
            n_top,
            hms_name,
            pms_name,
            policy,
            exec,
        } => {
            let labels = annotations(sheet.as_ref(), &id2, &annotation, config)?;
            let request = ReportRequest::new(input, output_dir, labels, policy)
                .with_n_top(n_top)
                .with_table_names(hms_name, pms_name);
            let outcome = workflow.report(request, &exec.computation("report")).await?;
            logger.info(format!(
                "Wrote {} report table(s); manifest at '{}'",
                outcome.manifest.len(),
                outcome.run.path.display()
            ));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            Logger::stderr(LogLevel::Error).error(format!("{err:#}"));
            return ExitCode::FAILURE;
        }
    };
    let logger = Logger::stderr(config.log_level);

    match execute(cli.command, &config, &logger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger.error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
