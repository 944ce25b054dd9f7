//! Uploader settings
//!
//! Settings are read from an INI file with a single `[uploader]` section:
//!
//! ```ini
//! [uploader]
//! forked_repo = git@github.com:me/test-results.git
//! upstream_repo = https://github.com/org/test-results
//! author_name = CI Bot
//! author_email = ci@example.com
//! branch_name_pattern = results-%Y%m%d%H%M%S
//! commit_message = Add new results files
//! ```

use std::path::{Component, Path, PathBuf};

use ini::Ini;

use crate::core::request::EmptySelectionPolicy;
use crate::error::{Result, UploaderError};

/// Default settings file, looked up in the current directory
pub const DEFAULT_SETTINGS_FILE: &str = "uploader.ini";

/// Section holding the uploader keys
pub const SECTION_NAME: &str = "uploader";

pub const DEFAULT_COMMIT_MESSAGE: &str = "Add new results files";
pub const DEFAULT_BRANCH_NAME_PATTERN: &str = "results-%Y%m%d%H%M%S";
pub const DEFAULT_TARGET_BRANCH: &str = "main";
pub const DEFAULT_RESULTS_PATH: &str = "results";

/// Settings loaded from the `[uploader]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Remote URL of the fork that receives the pushed branch
    pub forked_repo: String,
    /// Remote URL of the repository that receives the pull request
    pub upstream_repo: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub commit_message: String,
    /// strftime-style template for the per-run branch name
    pub branch_name_pattern: String,
    /// Upstream branch the results branch starts from and targets
    pub target_branch: String,
    /// Directory inside the working copy where result files are stored
    pub results_path: PathBuf,
    /// What to do when no result file matches
    pub on_empty: EmptySelectionPolicy,
}

impl Settings {
    /// Load settings from an INI file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(UploaderError::Config(format!(
                "cannot find settings file: {}",
                path.display()
            )));
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
            .map_err(|e| match e {
                UploaderError::Config(msg) => {
                    UploaderError::Config(format!("{} (in {})", msg, path.display()))
                }
                other => other,
            })
    }

    /// Parse settings from INI text
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        let ini = Ini::load_from_str(contents)
            .map_err(|e| UploaderError::Config(format!("invalid settings file: {}", e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let section = ini.section(Some(SECTION_NAME)).ok_or_else(|| {
            UploaderError::Config(format!("missing [{}] section", SECTION_NAME))
        })?;

        let get = |key: &str| {
            section
                .get(key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                UploaderError::Config(format!("option '{}' must be provided", key))
            })
        };

        let on_empty = match get("on_empty") {
            Some(value) => EmptySelectionPolicy::parse(&value).ok_or_else(|| {
                UploaderError::Config(format!(
                    "invalid on_empty value '{}' (expected 'skip' or 'attempt')",
                    value
                ))
            })?,
            None => EmptySelectionPolicy::default(),
        };

        let results_path = get("results_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_PATH));
        let escapes_working_copy = results_path.is_absolute()
            || results_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes_working_copy {
            return Err(UploaderError::Config(format!(
                "results_path '{}' must be a relative path inside the repository",
                results_path.display()
            )));
        }

        Ok(Self {
            forked_repo: required("forked_repo")?,
            upstream_repo: required("upstream_repo")?,
            author_name: get("author_name"),
            author_email: get("author_email"),
            commit_message: get("commit_message")
                .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
            branch_name_pattern: get("branch_name_pattern")
                .unwrap_or_else(|| DEFAULT_BRANCH_NAME_PATTERN.to_string()),
            target_branch: get("target_branch")
                .unwrap_or_else(|| DEFAULT_TARGET_BRANCH.to_string()),
            results_path,
            on_empty,
        })
    }
}
