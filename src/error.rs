//! Error types for results-uploader
//!
//! User-friendly error messages for every way a publish run can fail.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the uploader
#[derive(Error, Debug)]
pub enum UploaderError {
    /// Bad or missing settings, no run is attempted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Results directory does not exist
    #[error("Results directory not found: {}\n\n  → Check the --results-directory path.", .0.display())]
    NotFound(PathBuf),

    /// Authentication or connectivity failure against a remote
    #[error("Remote access failed: {0}\n\n  → Check your network connection and repository credentials.")]
    RemoteAccess(String),

    /// Token rejected by the hosting API
    #[error("GitHub rejected the token: {0}\n\n  → Make sure --token or GITHUB_TOKEN holds a valid token with 'repo' scope.")]
    Auth(String),

    /// Branch or pull request already exists
    #[error("{0}\n\n  → Resolve the conflict manually, then run again.")]
    Conflict(String),

    /// Staging produced no changes
    #[error("Nothing to commit: no result files were staged.")]
    NothingToCommit,

    /// Local file staging failure
    #[error("Failed to stage {} ({staged} file(s) staged before the failure): {source}", .path.display())]
    Io {
        /// File being staged when the failure occurred
        path: PathBuf,
        /// Files successfully staged before the failure
        staged: usize,
        #[source]
        source: std::io::Error,
    },

    /// Local git operation error
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl UploaderError {
    /// Stable name of the error kind, printed alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            UploaderError::Config(_) => "ConfigError",
            UploaderError::NotFound(_) => "NotFoundError",
            UploaderError::RemoteAccess(_) => "RemoteAccessError",
            UploaderError::Auth(_) => "AuthError",
            UploaderError::Conflict(_) => "ConflictError",
            UploaderError::NothingToCommit => "NothingToCommitError",
            UploaderError::Io { .. } => "IOError",
            UploaderError::Git(_) => "GitError",
        }
    }

    /// Wrap an IO error that is not tied to a single staged file
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploaderError::Io {
            path: path.into(),
            staged: 0,
            source,
        }
    }
}

impl From<octocrab::Error> for UploaderError {
    fn from(err: octocrab::Error) -> Self {
        crate::github::error_handler::classify_github_error(err)
    }
}

impl From<ini::Error> for UploaderError {
    fn from(err: ini::Error) -> Self {
        UploaderError::Config(format!("cannot read settings file: {}", err))
    }
}

/// Result type alias using UploaderError
pub type Result<T> = std::result::Result<T, UploaderError>;
