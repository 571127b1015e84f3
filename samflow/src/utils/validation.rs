//! Directory normalization and validation.
//!
//! Downstream assembly code expects mapping directories written with a
//! trailing separator. Normalization is a pure function returning a new
//! [`NormalizedDir`]; validation then checks that the directory exists.

use crate::errors::{DirectoryNotFoundError, Result, SamflowError};
use glob::Pattern;
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// A directory reference ending in exactly one path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedDir(String);

impl NormalizedDir {
    /// Returns the normalized string, trailing separator included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory as a path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Converts into an owned path.
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        PathBuf::from(self.0)
    }
}

impl fmt::Display for NormalizedDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for NormalizedDir {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == MAIN_SEPARATOR
}

/// Normalizes a directory reference so it ends in exactly one separator.
///
/// Redundant trailing separators are collapsed and an empty path becomes
/// the current directory. Applying it twice yields the same value.
///
/// # Examples
///
/// ```
/// use samflow::utils::normalize_dir;
/// use std::path::Path;
///
/// assert_eq!(normalize_dir(Path::new("maps")).as_str(), "maps/");
/// assert_eq!(normalize_dir(Path::new("maps//")).as_str(), "maps/");
/// ```
#[must_use]
pub fn normalize_dir(path: &Path) -> NormalizedDir {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches(is_separator);

    if trimmed.is_empty() {
        // Either empty input (current directory) or the filesystem root.
        return if raw.is_empty() {
            NormalizedDir(format!(".{MAIN_SEPARATOR}"))
        } else {
            NormalizedDir(MAIN_SEPARATOR.to_string())
        };
    }

    NormalizedDir(format!("{trimmed}{MAIN_SEPARATOR}"))
}

/// Normalizes `path` and asserts it names an existing directory.
///
/// # Errors
///
/// Returns [`DirectoryNotFoundError`] naming the normalized path and
/// `operation` when nothing exists there or it is not a directory. The
/// check is never retried.
pub fn validate_dir(path: &Path, operation: &str) -> Result<NormalizedDir, DirectoryNotFoundError> {
    let normalized = normalize_dir(path);
    let target = normalized.as_path();

    if !target.exists() {
        return Err(DirectoryNotFoundError::missing(normalized.as_str(), operation));
    }
    if !target.is_dir() {
        return Err(DirectoryNotFoundError::not_a_directory(normalized.as_str(), operation));
    }
    Ok(normalized)
}

/// Recursively lists files under `dir` with the given extension, sorted.
///
/// # Errors
///
/// [`SamflowError::Io`] naming the entry that could not be read.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*.{}",
        glob_root(dir),
        Pattern::escape(extension.trim_start_matches('.'))
    );
    let mut found = glob_files(&pattern, "list files")?;
    found.sort();
    Ok(found)
}

/// `dir` escaped for use as a glob prefix, without a trailing separator.
pub(crate) fn glob_root(dir: &Path) -> String {
    let raw = dir.to_string_lossy();
    let trimmed = raw.trim_end_matches(is_separator);
    if trimmed.is_empty() && !raw.is_empty() {
        return String::new();
    }
    Pattern::escape(if trimmed.is_empty() { "." } else { trimmed })
}

/// Regular files matching `pattern`, in glob order.
pub(crate) fn glob_files(pattern: &str, operation: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| SamflowError::Config(format!("invalid file pattern '{pattern}': {e}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            SamflowError::io(operation, path, e.into_error())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DirectoryIssue;

    fn sep(s: &str) -> String {
        s.replace('/', &MAIN_SEPARATOR.to_string())
    }

    #[test]
    fn test_normalize_appends_separator() {
        assert_eq!(normalize_dir(Path::new("maps")).as_str(), sep("maps/"));
    }

    #[test]
    fn test_normalize_keeps_single_separator() {
        assert_eq!(normalize_dir(Path::new("maps/")).as_str(), sep("maps/"));
        assert_eq!(normalize_dir(Path::new("maps///")).as_str(), sep("maps/"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["maps", "maps/", "a/b/c", "a/b//", "", "/"] {
            let once = normalize_dir(Path::new(raw));
            let twice = normalize_dir(once.as_path());
            assert_eq!(once, twice, "input {raw:?}");
            assert!(once.as_str().ends_with(MAIN_SEPARATOR));
        }
    }

    #[test]
    fn test_normalize_empty_and_root() {
        assert_eq!(normalize_dir(Path::new("")).as_str(), sep("./"));
        assert_eq!(normalize_dir(Path::new("/")).as_str(), MAIN_SEPARATOR.to_string());
    }

    #[test]
    fn test_validate_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps");
        std::fs::create_dir(&maps).unwrap();

        let normalized = validate_dir(&maps, "build").unwrap();
        assert!(normalized.as_str().ends_with(&sep("maps/")));
    }

    #[test]
    fn test_validate_missing_directory_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = validate_dir(&missing, "build").unwrap_err();
        assert_eq!(err.issue, DirectoryIssue::Missing);
        assert_eq!(err.operation, "build");
        assert!(err.path.ends_with(&sep("nope/")));
    }

    #[test]
    fn test_validate_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("maps");
        std::fs::write(&file, "not a dir").unwrap();

        let err = validate_dir(&file, "build").unwrap_err();
        assert_eq!(err.issue, DirectoryIssue::NotADirectory);
    }

    #[test]
    fn test_list_files_with_extension_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("sc_to_pl.txt"), "").unwrap();
        std::fs::write(dir.path().join("nested").join("pl_to_sc.txt"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let files = list_files_with_extension(dir.path(), "txt").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(files.len(), 2);
        assert!(names.contains(&"pl_to_sc.txt".to_string()));
        assert!(names.contains(&"sc_to_pl.txt".to_string()));
    }

    #[test]
    fn test_list_files_skips_directories_named_like_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("archive.txt")).unwrap();
        std::fs::write(dir.path().join("archive.txt").join("pl_to_sc.txt"), "").unwrap();

        let files = list_files_with_extension(dir.path(), ".txt").unwrap();

        assert_eq!(files, vec![dir.path().join("archive.txt").join("pl_to_sc.txt")]);
    }

    #[test]
    fn test_list_files_escapes_glob_characters_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps [v2]");
        std::fs::create_dir(&maps).unwrap();
        std::fs::write(maps.join("pl_to_sc.txt"), "").unwrap();

        assert_eq!(list_files_with_extension(&maps, "txt").unwrap().len(), 1);
        assert!(list_files_with_extension(&dir.path().join("missing"), "txt").unwrap().is_empty());
    }
}
