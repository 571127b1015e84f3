//! Computations backed by an external program.

use super::{Computation, ComputationRequest};
use crate::errors::ComputationError;
use crate::logging::Console;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Environment variable naming the file the program must write its JSON
/// result to.
pub const RESULT_PATH_ENV: &str = "SAMFLOW_RESULT_PATH";

/// Environment variable naming the stage being executed.
pub const STAGE_ENV: &str = "SAMFLOW_STAGE";

/// Runs an external program for each stage invocation.
///
/// The request is written to the program's stdin as JSON. Everything it
/// prints on stdout or stderr is forwarded line by line to the stage
/// console. The program writes its result as JSON to the path in
/// [`RESULT_PATH_ENV`] and exits with status zero.
#[derive(Debug, Clone)]
pub struct CommandComputation {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    scratch_dir: PathBuf,
}

impl CommandComputation {
    /// Creates a computation running `program`.
    #[must_use]
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Sets the program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets the directory for transient result files.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// The program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn result_path(&self, request: &ComputationRequest) -> PathBuf {
        self.scratch_dir.join(format!(
            "samflow-{}-{}.json",
            request.stage,
            crate::utils::generate_uuid().simple()
        ))
    }
}

#[async_trait]
impl Computation for CommandComputation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        request: &ComputationRequest,
        console: &Console,
    ) -> Result<serde_json::Value, ComputationError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| ComputationError::failed(&self.name, format!("cannot encode request: {e}")))?;
        // Removed on drop, including when a stage timeout cancels this future.
        let result_path = TempPath::from_path(self.result_path(request));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(RESULT_PATH_ENV, &*result_path)
            .env(STAGE_ENV, request.stage.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ComputationError::Spawn {
                computation: self.name.clone(),
                reason: format!("{}: {e}", self.program.display()),
            })?;

        let stdin = child.stdin.take();
        let write_request = async move {
            if let Some(mut stdin) = stdin {
                // Programs that ignore their input close the pipe early.
                let _ = stdin.write_all(&payload).await;
            }
        };
        tokio::join!(
            write_request,
            forward_lines(child.stdout.take(), console),
            forward_lines(child.stderr.take(), console),
        );

        let status = child.wait().await.map_err(|e| ComputationError::failed(&self.name, e.to_string()));
        let outcome = match status {
            Ok(status) if status.success() => read_result(&self.name, &result_path).await,
            Ok(status) => Err(ComputationError::NonZeroExit {
                computation: self.name.clone(),
                code: status.code(),
            }),
            Err(e) => Err(e),
        };

        let result_display = result_path.display().to_string();
        if let Err(e) = result_path.close() {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %result_display, error = %e, "could not remove result file");
            }
        }
        outcome
    }
}

/// Forwards every line until EOF. Bytes that are not UTF-8 are replaced
/// rather than ending the stream, so the pipe is always drained.
async fn forward_lines<R>(reader: Option<R>, console: &Console)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else { return };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                console.line(text.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading computation output");
                break;
            }
        }
    }
}

async fn read_result(name: &str, path: &Path) -> Result<serde_json::Value, ComputationError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ComputationError::MissingResult {
                computation: name.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(ComputationError::failed(name, format!("cannot read result: {e}"))),
    };
    serde_json::from_slice(&bytes).map_err(|e| ComputationError::malformed(name, e.to_string()))
}
