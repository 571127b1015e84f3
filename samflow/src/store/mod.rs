//! Persistence of stage artifacts.
//!
//! The store writes any serializable value as JSON and reads it back. It
//! never inspects what it stores; whether a payload is compatible with the
//! stage that consumes it is decided by that stage.

mod naming;

pub use naming::ArtifactName;

use crate::core::StageArtifact;
use crate::errors::{ArtifactError, ArtifactFault, Result, SamflowError};
use crate::utils::RunId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default artifact file extension.
pub const DEFAULT_EXTENSION: &str = "json";

/// Reads and writes artifacts for one run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_id: RunId,
    extension: String,
}

impl ArtifactStore {
    /// Creates a store for `run_id` writing files with `extension`.
    #[must_use]
    pub fn new(run_id: RunId, extension: impl Into<String>) -> Self {
        Self {
            run_id,
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// The run this store names outputs for.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The artifact file extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The path `name` resolves to in `dir`.
    ///
    /// Fixed names always map to the same path. Unique names get a `-N`
    /// counter if a file with the same name already exists.
    #[must_use]
    pub fn path_for(&self, dir: &Path, name: &ArtifactName) -> PathBuf {
        let first = dir.join(name.file_name(&self.run_id, &self.extension));
        if matches!(name, ArtifactName::Fixed(_)) || !first.exists() {
            return first;
        }
        (2..)
            .map(|n| dir.join(name.numbered_file_name(&self.run_id, &self.extension, n)))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }

    /// Serializes `value` into `dir` under `name`, returning the written path.
    pub fn store<T: Serialize + ?Sized>(&self, value: &T, dir: &Path, name: &ArtifactName) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| SamflowError::io("create artifact directory", dir, e))?;
        let path = self.path_for(dir, name);
        self.write_to(value, &path)?;
        Ok(path)
    }

    /// Serializes `value` to exactly `path`.
    pub fn write_to<T: Serialize + ?Sized>(&self, value: &T, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| SamflowError::Serialization(format!("{}: {e}", path.display())))?;
        write_atomic(path, &bytes, "write artifact")
    }

    /// Deserializes a value from `path`.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ArtifactError> {
        let bytes = fs::read(path).map_err(|e| {
            let fault = if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactFault::Missing
            } else {
                ArtifactFault::Unreadable(e.to_string())
            };
            ArtifactError::new(path, fault)
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ArtifactError::new(path, ArtifactFault::Malformed(e.to_string())))
    }

    /// Loads a [`StageArtifact`], rejecting formats newer than this build.
    pub fn load_artifact(&self, path: &Path) -> Result<StageArtifact, ArtifactError> {
        let artifact: StageArtifact = self.load(path)?;
        if !artifact.is_supported_version() {
            return Err(ArtifactError::new(
                path,
                ArtifactFault::UnsupportedVersion {
                    found: artifact.format_version,
                    supported: crate::core::ARTIFACT_FORMAT_VERSION,
                },
            ));
        }
        Ok(artifact)
    }
}

/// Writes `bytes` to `path` through a hidden sibling that is renamed into
/// place, so readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8], operation: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = crate::utils::generate_uuid().simple().to_string();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", &suffix[..8]));

    fs::write(&tmp, bytes).map_err(|e| SamflowError::io(operation, &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        SamflowError::io(operation, path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        cells: u32,
        genes: Vec<String>,
    }

    fn store() -> ArtifactStore {
        ArtifactStore::new(RunId::new(), DEFAULT_EXTENSION)
    }

    #[test]
    fn test_store_creates_directories_and_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = store();
        let payload = Payload {
            cells: 3,
            genes: vec!["wnt1".to_string()],
        };

        let path = store.store(&payload, &nested, &ArtifactName::fixed("samap")).unwrap();

        assert_eq!(path, nested.join("samap.json"));
        assert_eq!(store.load::<Payload>(&path).unwrap(), payload);
        assert_eq!(fs::read_dir(&nested).unwrap().count(), 1);
    }

    #[test]
    fn test_fixed_name_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let name = ArtifactName::fixed("samap");

        store.store(&1u32, dir.path(), &name).unwrap();
        let path = store.store(&2u32, dir.path(), &name).unwrap();

        assert_eq!(store.load::<u32>(&path).unwrap(), 2);
    }

    #[test]
    fn test_unique_names_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let name = ArtifactName::unique("manifest");

        let first = store.store(&1u32, dir.path(), &name).unwrap();
        let second = store.store(&2u32, dir.path(), &name).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.load::<u32>(&first).unwrap(), 1);
        assert_eq!(store.load::<u32>(&second).unwrap(), 2);
    }

    #[test]
    fn test_unique_names_differ_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let name = ArtifactName::unique("manifest");

        let first = store().store(&1u32, dir.path(), &name).unwrap();
        let second = store().store(&2u32, dir.path(), &name).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = store().load::<u32>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.fault, ArtifactFault::Missing);
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ truncated").unwrap();

        let err = store().load::<Payload>(&path).unwrap_err();
        assert!(matches!(err.fault, ArtifactFault::Malformed(_)));
        assert_eq!(err.path, path);
    }

    #[test]
    fn test_load_artifact_rejects_newer_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let mut artifact = StageArtifact::new(StageKind::Run, "x", "run", serde_json::json!({}));
        artifact.format_version = crate::core::ARTIFACT_FORMAT_VERSION + 1;
        let path = store.store(&artifact, dir.path(), &ArtifactName::fixed("x")).unwrap();

        let err = store.load_artifact(&path).unwrap_err();
        assert!(matches!(err.fault, ArtifactFault::UnsupportedVersion { .. }));
    }
}
