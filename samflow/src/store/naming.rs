//! Output naming.

use crate::core::{SampleKey, StageKind};
use crate::utils::RunId;
use std::path::Path;

/// How an artifact file is named inside its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactName {
    /// A caller-chosen name. Writing again replaces the previous file.
    Fixed(String),
    /// A stem made unique with the run's start time and run id.
    Unique(String),
}

impl ArtifactName {
    /// A fixed name.
    #[must_use]
    pub fn fixed(name: impl Into<String>) -> Self {
        Self::Fixed(name.into())
    }

    /// A run-unique name built from `stem`.
    #[must_use]
    pub fn unique(stem: impl Into<String>) -> Self {
        Self::Unique(stem.into())
    }

    /// `<key>_<stage>` for per-sample artifacts.
    #[must_use]
    pub fn for_sample(key: &SampleKey, kind: StageKind) -> Self {
        Self::Fixed(format!("{key}_{}", kind.file_stem()))
    }

    /// The file name this resolves to, before collision handling.
    #[must_use]
    pub fn file_name(&self, run: &RunId, extension: &str) -> String {
        match self {
            Self::Fixed(name) => with_extension(name, extension),
            Self::Unique(stem) => format!("{stem}_{}.{extension}", run.file_suffix()),
        }
    }

    /// The file name with a collision counter, for unique names.
    pub(crate) fn numbered_file_name(&self, run: &RunId, extension: &str, counter: usize) -> String {
        match self {
            Self::Fixed(_) => self.file_name(run, extension),
            Self::Unique(stem) => format!("{stem}_{}-{counter}.{extension}", run.file_suffix()),
        }
    }
}

fn with_extension(name: &str, extension: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}.{extension}")
    }
}
