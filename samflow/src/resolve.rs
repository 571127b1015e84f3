//! Identifier resolution.
//!
//! Maps a [`SampleKey`] to exactly one artifact path, either by prefix
//! matching file names in a directory or by direct lookup in a table.
//!
//! When several files in a directory share the key as prefix, the
//! lexicographically smallest file name wins. The alternatives are reported
//! in [`Resolution::alternatives`] so callers can warn about the ambiguity.

use crate::core::SampleKey;
use crate::errors::{DirectoryNotFoundError, NotFoundError, Result, SamflowError};
use crate::logging::Logger;
use crate::pipeline::{BatchOutcome, BatchProcessor, FailurePolicy};
use crate::utils::validation::{glob_files, glob_root};
use glob::Pattern;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where the resolver looks for artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRoot {
    /// Prefix match against regular files in a directory.
    Directory {
        /// Directory to list.
        dir: PathBuf,
        /// Required file extension, without the dot.
        extension: Option<String>,
    },
    /// Direct lookup in a key to path table.
    Table(BTreeMap<SampleKey, PathBuf>),
}

impl SearchRoot {
    /// Prefix search in `dir`, restricted to files with `extension`.
    #[must_use]
    pub fn directory(dir: impl Into<PathBuf>, extension: Option<&str>) -> Self {
        Self::Directory {
            dir: dir.into(),
            extension: extension.map(|e| e.trim_start_matches('.').to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Directory { dir, extension: Some(ext) } => {
                format!("directory '{}' (*.{ext})", dir.display())
            }
            Self::Directory { dir, extension: None } => format!("directory '{}'", dir.display()),
            Self::Table(table) => format!("sample table ({} entries)", table.len()),
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The key that was resolved.
    pub key: SampleKey,
    /// The chosen path.
    pub path: PathBuf,
    /// Other matching paths that lost the tie-break, sorted.
    pub alternatives: Vec<PathBuf>,
}

impl Resolution {
    /// Returns true if more than one file matched.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.alternatives.is_empty()
    }
}

/// Resolves sample keys against a search root.
#[derive(Debug, Clone)]
pub struct IdentifierResolver {
    root: SearchRoot,
}

impl IdentifierResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(root: SearchRoot) -> Self {
        Self { root }
    }

    /// The search root.
    #[must_use]
    pub fn root(&self) -> &SearchRoot {
        &self.root
    }

    /// Resolves a key to a single path.
    ///
    /// # Errors
    ///
    /// [`SamflowError::NotFound`] when nothing matches and
    /// [`SamflowError::DirectoryNotFound`] when the search directory is
    /// missing.
    pub fn resolve(&self, key: &SampleKey) -> Result<PathBuf> {
        self.resolve_detailed(key).map(|r| r.path)
    }

    /// Resolves a key, keeping the candidates that lost the tie-break.
    pub fn resolve_detailed(&self, key: &SampleKey) -> Result<Resolution> {
        match &self.root {
            SearchRoot::Table(table) => table
                .get(key)
                .map(|path| Resolution {
                    key: key.clone(),
                    path: path.clone(),
                    alternatives: Vec::new(),
                })
                .ok_or_else(|| NotFoundError::new(key.as_str(), self.root.describe()).into()),
            SearchRoot::Directory { dir, extension } => {
                let mut candidates = prefix_matches(dir, key.as_str(), extension.as_deref())?;
                if candidates.is_empty() {
                    return Err(NotFoundError::new(key.as_str(), self.root.describe()).into());
                }
                let path = candidates.remove(0);
                Ok(Resolution {
                    key: key.clone(),
                    path,
                    alternatives: candidates,
                })
            }
        }
    }

    /// Resolves every key under an explicit failure policy.
    ///
    /// Ambiguous matches are logged as warnings naming the chosen file.
    pub fn resolve_all(
        &self,
        keys: &[SampleKey],
        policy: FailurePolicy,
        logger: &Logger,
    ) -> Result<BatchOutcome<PathBuf>> {
        let batch = BatchProcessor::new("resolve", policy, logger.clone());
        batch.run(keys, |key| {
            let resolution = self.resolve_detailed(key)?;
            if resolution.is_ambiguous() {
                logger.warn(format!(
                    "  {} files match '{}'; using '{}'",
                    resolution.alternatives.len() + 1,
                    key,
                    resolution.path.display()
                ));
            }
            Ok(resolution.path)
        })
    }
}

/// Lists regular files in `dir` whose names start with `prefix`, sorted by
/// file name.
fn prefix_matches(dir: &Path, prefix: &str, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    const OPERATION: &str = "identifier resolution";
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(DirectoryNotFoundError::not_a_directory(dir.display().to_string(), OPERATION).into());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DirectoryNotFoundError::missing(dir.display().to_string(), OPERATION).into());
        }
        Err(e) => return Err(SamflowError::io(OPERATION, dir, e)),
    }

    let file_pattern = match extension {
        Some(ext) => format!("{}*.{}", Pattern::escape(prefix), Pattern::escape(ext)),
        None => format!("{}*", Pattern::escape(prefix)),
    };
    let mut matches = glob_files(&format!("{}/{file_pattern}", glob_root(dir)), OPERATION)?;
    matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CollectingLogSink, LogLevel};
    use std::sync::Arc;

    fn key(s: &str) -> SampleKey {
        SampleKey::new(s).unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "{}").unwrap();
        path
    }

    #[test]
    fn test_directory_prefix_match() {
        let dir = tempfile::tempdir().unwrap();
        let pl = touch(dir.path(), "pl_sam.json");
        touch(dir.path(), "sc_sam.json");

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some("json")));
        assert_eq!(resolver.resolve(&key("pl")).unwrap(), pl);
    }

    #[test]
    fn test_directory_tie_break_is_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pl_sam_v2.json");
        let first = touch(dir.path(), "pl_sam.json");
        touch(dir.path(), "plx_sam.json");

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some("json")));
        let resolution = resolver.resolve_detailed(&key("pl")).unwrap();

        assert_eq!(resolution.path, first);
        assert_eq!(resolution.alternatives.len(), 2);
        assert!(resolution.is_ambiguous());
    }

    #[test]
    fn test_directory_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pl_sam.pkl");

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some(".json")));
        let err = resolver.resolve(&key("pl")).unwrap_err();
        assert!(matches!(err, SamflowError::NotFound(ref e) if e.key == "pl"));
    }

    #[test]
    fn test_directory_keys_are_matched_literally() {
        let dir = tempfile::tempdir().unwrap();
        let bracketed = touch(dir.path(), "pl[1]_sam.json");
        touch(dir.path(), "pl1_sam.json");

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some("json")));
        let resolution = resolver.resolve_detailed(&key("pl[1]")).unwrap();

        assert_eq!(resolution.path, bracketed);
        assert!(!resolution.is_ambiguous());
        assert!(matches!(resolver.resolve(&key("pl*")), Err(SamflowError::NotFound(_))));
    }

    #[test]
    fn test_directory_that_is_a_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "sams");

        let err = IdentifierResolver::new(SearchRoot::directory(file, None))
            .resolve(&key("pl"))
            .unwrap_err();
        assert!(matches!(err, SamflowError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_directory_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pl_old")).unwrap();

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), None));
        assert!(matches!(resolver.resolve(&key("pl")), Err(SamflowError::NotFound(_))));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let resolver =
            IdentifierResolver::new(SearchRoot::directory(dir.path().join("absent"), None));

        let err = resolver.resolve(&key("pl")).unwrap_err();
        assert!(matches!(err, SamflowError::DirectoryNotFound(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_table_lookup() {
        let mut table = BTreeMap::new();
        table.insert(key("pl"), PathBuf::from("pl.h5ad"));
        table.insert(key("sc"), PathBuf::from("sc.h5ad"));
        let resolver = IdentifierResolver::new(SearchRoot::Table(table));

        assert_eq!(resolver.resolve(&key("sc")).unwrap(), PathBuf::from("sc.h5ad"));

        let err = resolver.resolve(&key("hs")).unwrap_err();
        assert!(err.to_string().contains("'hs'"));
    }

    #[test]
    fn test_resolve_all_yields_every_present_key() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["hs_sam.json", "pl_sam.json", "sc_sam.json"] {
            touch(dir.path(), name);
        }
        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some("json")));
        let keys = vec![key("sc"), key("hs"), key("pl")];

        let outcome = resolver
            .resolve_all(&keys, FailurePolicy::FailFast, &Logger::disabled())
            .unwrap();

        assert_eq!(outcome.resolved.len(), 3);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_resolve_all_warns_on_ambiguity() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pl_a.json");
        touch(dir.path(), "pl_b.json");
        let sink = Arc::new(CollectingLogSink::new());
        let logger = Logger::new(LogLevel::Debug, sink.clone());

        let resolver = IdentifierResolver::new(SearchRoot::directory(dir.path(), Some("json")));
        resolver
            .resolve_all(&[key("pl")], FailurePolicy::WarnAndSkip, &logger)
            .unwrap();

        let warnings = sink.messages_at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("pl_a.json"));
    }
}
