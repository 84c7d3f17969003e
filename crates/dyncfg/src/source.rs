//! Configuration sources: property files and directories of property files.
//!
//! A [`SourceDescriptor`] is an ordered reference to one configuration
//! origin. Resolving a descriptor yields the ordered key/value pairs it
//! currently contains; a directory aggregates all regular files it contains,
//! sorted by file name.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigResult, DynConfigError};

/// An ordered reference to one configuration source.
///
/// Descriptors are created at build time, at which point the path must
/// exist. Whether the path is a file or a directory is captured once;
/// resolution follows that shape from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    path: PathBuf,
    directory: bool,
}

impl SourceDescriptor {
    /// Create a descriptor for an existing file or directory.
    ///
    /// # Errors
    ///
    /// Returns [`DynConfigError::SourceNotFound`] if the path does not exist.
    pub fn new(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(DynConfigError::source_not_found(path));
        }
        let directory = path.is_dir();
        Ok(Self { path, directory })
    }

    /// The source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this source is a directory of property files.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// Resolve the source into its current ordered key/value pairs.
    ///
    /// For a directory, contained regular files are read in file-name order
    /// and their pairs concatenated, so earlier files take precedence once
    /// the merge applies its fill-only-absent rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has disappeared or cannot be read.
    pub fn resolve(&self) -> ConfigResult<Vec<(String, String)>> {
        if self.directory {
            self.resolve_directory()
        } else {
            self.resolve_file(&self.path)
        }
    }

    fn resolve_file(&self, path: &Path) -> ConfigResult<Vec<(String, String)>> {
        let content = fs::read_to_string(path)
            .map_err(|e| DynConfigError::invalid_source(path, e.to_string()))?;
        let pairs = parse_properties(&content);
        debug!(path = %path.display(), entries = pairs.len(), "resolved source file");
        Ok(pairs)
    }

    fn resolve_directory(&self) -> ConfigResult<Vec<(String, String)>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.path)
            .map_err(|e| DynConfigError::invalid_source(&self.path, e.to_string()))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        let mut pairs = Vec::new();
        for file in &files {
            pairs.extend(self.resolve_file(file)?);
        }
        debug!(
            path = %self.path.display(),
            files = files.len(),
            entries = pairs.len(),
            "resolved source directory"
        );
        Ok(pairs)
    }
}

/// Parse property-file content into ordered key/value pairs.
///
/// Supports `key=value` and `key: value` lines, `#` and `!` comments, and
/// skips blank lines. Keys and values are trimmed. When a key occurs more
/// than once in the same content, the last occurrence wins but the key keeps
/// its original position.
#[must_use]
pub fn parse_properties(content: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some(sep) = line.find(['=', ':']) else {
            continue;
        };
        let key = line[..sep].trim();
        if key.is_empty() {
            continue;
        }
        let value = line[sep + 1..].trim();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
    }
    pairs
}

/// Deduplicate source paths while preserving first-occurrence order.
#[must_use]
pub fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = Vec::with_capacity(paths.len());
    for path in paths {
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}
