//! Error types for samflow.
//!
//! Every fatal condition names the offending key or path together with the
//! operation that was attempted, so a failing run can be corrected without
//! reading the source.

use crate::core::StageState;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for samflow operations.
#[derive(Debug, Error)]
pub enum SamflowError {
    /// A sample key could not be resolved to an artifact.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A directory required by a downstream call is missing.
    #[error("{0}")]
    DirectoryNotFound(#[from] DirectoryNotFoundError),

    /// A stored artifact is absent or cannot be deserialized.
    #[error("{0}")]
    CorruptOrMissingArtifact(#[from] ArtifactError),

    /// The external computation failed.
    #[error("{0}")]
    ExternalComputationFailure(#[from] ComputationError),

    /// The sample sheet is malformed.
    #[error("{0}")]
    Sheet(#[from] SheetError),

    /// An output was recorded twice in a manifest.
    #[error("{0}")]
    ManifestConflict(#[from] ManifestConflictError),

    /// Too few samples resolved to assemble an alignment object.
    #[error("Insufficient samples for {operation}: {found} resolved, at least {required} required")]
    InsufficientSamples {
        /// The operation that needed the samples.
        operation: String,
        /// Number of samples that resolved.
        found: usize,
        /// Minimum number required.
        required: usize,
    },

    /// A stage attempted an illegal state transition.
    #[error("Invalid transition for stage '{stage}': {from} -> {to}")]
    InvalidTransition {
        /// The stage name.
        stage: String,
        /// Current state.
        from: StageState,
        /// Requested state.
        to: StageState,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error outside of artifact loading.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error tied to a path.
    #[error("IO error during {operation} on '{}': {source}", .path.display())]
    Io {
        /// The operation that was attempted.
        operation: String,
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SamflowError {
    /// Creates an IO error for a path.
    #[must_use]
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Returns the taxonomy name of the error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::DirectoryNotFound(_) => "DirectoryNotFound",
            Self::CorruptOrMissingArtifact(_) => "CorruptOrMissingArtifact",
            Self::ExternalComputationFailure(_) => "ExternalComputationFailure",
            Self::Sheet(_) => "SheetError",
            Self::ManifestConflict(_) => "ManifestConflict",
            Self::InsufficientSamples { .. } => "InsufficientSamples",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::Config(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
            Self::Io { .. } => "IoError",
        }
    }

    /// Returns true if a batch running under warn-and-skip may skip the
    /// failing key and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::CorruptOrMissingArtifact(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("recoverable".to_string(), serde_json::json!(self.is_recoverable()));
        map
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SamflowError> = std::result::Result<T, E>;

/// Raised when a sample key has no matching artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No artifact found for sample '{key}' in {searched}")]
pub struct NotFoundError {
    /// The key that failed to resolve.
    pub key: String,
    /// Description of where the resolver looked.
    pub searched: String,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(key: impl Into<String>, searched: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            searched: searched.into(),
        }
    }
}

/// Why a directory failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryIssue {
    /// Nothing exists at the path.
    Missing,
    /// The path exists but is not a directory.
    NotADirectory,
}

impl fmt::Display for DirectoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "does not exist"),
            Self::NotADirectory => write!(f, "is not a directory"),
        }
    }
}

/// Raised when a directory precondition fails. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Directory '{path}' required by {operation} {issue}")]
pub struct DirectoryNotFoundError {
    /// The normalized path that was checked.
    pub path: String,
    /// The operation that needed the directory.
    pub operation: String,
    /// What was wrong with it.
    pub issue: DirectoryIssue,
}

impl DirectoryNotFoundError {
    /// Creates an error for a missing directory.
    #[must_use]
    pub fn missing(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            issue: DirectoryIssue::Missing,
        }
    }

    /// Creates an error for a path that is not a directory.
    #[must_use]
    pub fn not_a_directory(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            issue: DirectoryIssue::NotADirectory,
        }
    }
}

/// Why an artifact could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactFault {
    /// The file does not exist.
    #[error("file does not exist")]
    Missing,
    /// The file exists but could not be read.
    #[error("unreadable: {0}")]
    Unreadable(String),
    /// The content could not be deserialized.
    #[error("malformed content: {0}")]
    Malformed(String),
    /// The artifact was written by a newer format.
    #[error("format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Highest version this build reads.
        supported: u32,
    },
}

/// Raised when a stored artifact is missing or corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Corrupt or missing artifact '{}': {fault}", .path.display())]
pub struct ArtifactError {
    /// The artifact path.
    pub path: PathBuf,
    /// What went wrong.
    pub fault: ArtifactFault,
}

impl ArtifactError {
    /// Creates a new artifact error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, fault: ArtifactFault) -> Self {
        Self {
            path: path.into(),
            fault,
        }
    }
}

/// Failures surfaced from an external computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationError {
    /// The computation reported a failure.
    #[error("Computation '{computation}' failed: {reason}")]
    Failed {
        /// Computation name.
        computation: String,
        /// Reported reason.
        reason: String,
    },

    /// The external process could not be started.
    #[error("Computation '{computation}' could not be started: {reason}")]
    Spawn {
        /// Computation name.
        computation: String,
        /// Reason.
        reason: String,
    },

    /// The external process exited unsuccessfully.
    #[error("Computation '{computation}' exited with {}", describe_exit(.code))]
    NonZeroExit {
        /// Computation name.
        computation: String,
        /// Exit code, if any.
        code: Option<i32>,
    },

    /// The computation did not finish within the stage timeout.
    #[error("Computation '{computation}' timed out after {seconds}s")]
    TimedOut {
        /// Computation name.
        computation: String,
        /// Timeout in seconds.
        seconds: f64,
    },

    /// The computation finished without producing a result.
    #[error("Computation '{computation}' produced no result at '{}'", .path.display())]
    MissingResult {
        /// Computation name.
        computation: String,
        /// Where the result was expected.
        path: PathBuf,
    },

    /// The computation produced a result of the wrong shape.
    #[error("Computation '{computation}' produced malformed output: {reason}")]
    MalformedOutput {
        /// Computation name.
        computation: String,
        /// What was wrong.
        reason: String,
    },
}

impl ComputationError {
    /// Creates a failed error.
    #[must_use]
    pub fn failed(computation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            computation: computation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed output error.
    #[must_use]
    pub fn malformed(computation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            computation: computation.into(),
            reason: reason.into(),
        }
    }

    /// Returns the name of the computation that failed.
    #[must_use]
    pub fn computation(&self) -> &str {
        match self {
            Self::Failed { computation, .. }
            | Self::Spawn { computation, .. }
            | Self::NonZeroExit { computation, .. }
            | Self::TimedOut { computation, .. }
            | Self::MissingResult { computation, .. }
            | Self::MalformedOutput { computation, .. } => computation,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// Errors raised while reading a sample sheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    /// The sheet could not be read or parsed as CSV.
    #[error("Failed to read sample sheet '{source_name}': {reason}")]
    Read {
        /// Path or name of the sheet.
        source_name: String,
        /// Reason.
        reason: String,
    },

    /// A required column is absent from the header.
    #[error("Sample sheet '{source_name}' has no '{column}' column")]
    MissingColumn {
        /// Path or name of the sheet.
        source_name: String,
        /// The missing column.
        column: String,
    },

    /// A row has an empty key.
    #[error("Sample sheet '{source_name}' row {row} has an empty key")]
    EmptyKey {
        /// Path or name of the sheet.
        source_name: String,
        /// One-based data row number.
        row: usize,
    },

    /// A key appears more than once.
    #[error("Sample sheet '{source_name}' row {row} repeats key '{key}'")]
    DuplicateKey {
        /// Path or name of the sheet.
        source_name: String,
        /// The repeated key.
        key: String,
        /// One-based data row number.
        row: usize,
    },

    /// Parallel key and path lists differ in length.
    #[error("Got {keys} sample keys but {paths} data paths")]
    LengthMismatch {
        /// Number of keys.
        keys: usize,
        /// Number of paths.
        paths: usize,
    },
}

/// Raised when an output name is recorded twice in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Manifest already records an output named '{name}'")]
pub struct ManifestConflictError {
    /// The conflicting output name.
    pub name: String,
}

impl ManifestConflictError {
    /// Creates a new manifest conflict error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
