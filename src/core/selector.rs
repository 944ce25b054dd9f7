//! Result file selection
//!
//! Matches a shell-style glob against the results directory. `*` never
//! crosses a path separator, so `*.json` only looks at the directory itself
//! while `**/*.json` or `suite-*/*.json` descend into per-suite subdirectories.

use std::path::{Path, PathBuf};

use glob::{glob_with, MatchOptions, Pattern};

use crate::error::{Result, UploaderError};

/// Ordered set of result files selected for publishing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedFileSet {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl SelectedFileSet {
    pub fn new(root: impl Into<PathBuf>, mut files: Vec<PathBuf>) -> Self {
        files.sort();
        files.dedup();
        Self {
            root: root.into(),
            files,
        }
    }

    /// Directory the selection was made from
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of a selected file relative to the results directory
    ///
    /// `None` for paths that are not under the root.
    pub fn relative_path<'a>(&self, file: &'a Path) -> Option<&'a Path> {
        file.strip_prefix(&self.root)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
    }
}

/// Select the regular files under `directory` whose path matches `pattern`
pub fn select(directory: &Path, pattern: &str) -> Result<SelectedFileSet> {
    if !directory.is_dir() {
        return Err(UploaderError::NotFound(directory.to_path_buf()));
    }

    // glob drops leading `./` from its matches, so anchor everything on an
    // absolute root for strip_prefix to line up
    let root: PathBuf = std::path::absolute(directory)
        .map_err(|e| UploaderError::io(directory, e))?
        .components()
        .collect();

    let full_pattern = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches('/')
    );
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let entries = glob_with(&full_pattern, options).map_err(|e| {
        UploaderError::Config(format!("invalid file pattern '{}': {}", pattern, e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            UploaderError::io(path, std::io::Error::from(e))
        })?;
        if path.is_file() {
            files.push(path);
        }
    }

    tracing::debug!(
        directory = %directory.display(),
        pattern,
        matched = files.len(),
        "Selected result files"
    );

    Ok(SelectedFileSet::new(root, files))
}
