//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::Parser;

use crate::core::config::DEFAULT_SETTINGS_FILE;
use crate::core::request::{EmptySelectionPolicy, PublishOptions};

/// results-uploader - publish test results as a pull request
///
/// Commits the result files matching PATTERN to a new branch on the fork
/// configured in the settings file, pushes it, and opens a pull request
/// against the upstream repository.
#[derive(Parser, Debug)]
#[command(name = "results-uploader", version, about, long_about = None)]
pub struct Cli {
    /// GitHub token used to open the pull request
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Directory where result files are stored
    #[arg(long, short = 'r', value_name = "PATH")]
    pub results_directory: PathBuf,

    /// Shell-style wildcard pattern for result files
    #[arg(long, short = 'p', default_value = "*.json")]
    pub pattern: String,

    /// Pull request title
    #[arg(long, short = 't')]
    pub title: String,

    /// Pull request description
    #[arg(long, short = 'b', default_value = "")]
    pub body: String,

    /// Working copy of the fork; cloned to a temporary directory if omitted
    #[arg(long, short = 'd', value_name = "PATH")]
    pub repo_directory: Option<PathBuf>,

    /// Path to the settings file
    #[arg(long, short = 'c', value_name = "PATH", default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    /// What to do when no file matches (overrides the settings file)
    #[arg(long, value_enum)]
    pub on_empty: Option<EmptySelectionPolicy>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Per-run inputs for request resolution
    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            token: self.token.clone(),
            results_directory: self.results_directory.clone(),
            pattern: self.pattern.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            repo_directory: self.repo_directory.clone(),
            on_empty: self.on_empty,
        }
    }
}
