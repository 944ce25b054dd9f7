//! Resolved publish request
//!
//! A `PublishRequest` is built once per run from the settings file and the
//! command line, validated up front, and then handed to the publisher as an
//! immutable value.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use clap::ValueEnum;
use secrecy::SecretString;

use crate::core::config::Settings;
use crate::core::repository::RemoteRepo;
use crate::error::{Result, UploaderError};

/// Policy applied when no result file matches the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EmptySelectionPolicy {
    /// Finish successfully without touching any remote
    #[default]
    Skip,
    /// Run the pipeline anyway; the commit step then fails with nothing to commit
    Attempt,
}

impl EmptySelectionPolicy {
    /// Parse a settings file value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(EmptySelectionPolicy::Skip),
            "attempt" => Some(EmptySelectionPolicy::Attempt),
            _ => None,
        }
    }
}

/// Commit author identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// strftime-style template rendering a unique branch name per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNameTemplate {
    pattern: String,
}

impl BranchNameTemplate {
    /// Validate a template
    ///
    /// The template must parse as strftime and contain at least one
    /// date/time specifier. Coarse templates such as `nightly-%Y%m%d` are
    /// accepted; a second run in the same period fails at BRANCH with a
    /// conflict instead of reusing the branch.
    pub fn parse(pattern: &str) -> Result<Self> {
        let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();

        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(UploaderError::Config(format!(
                "invalid branch_name_pattern '{}'",
                pattern
            )));
        }

        let has_time_specifier = items
            .iter()
            .any(|item| matches!(item, Item::Numeric(..) | Item::Fixed(..)));
        if !has_time_specifier {
            return Err(UploaderError::Config(format!(
                "branch_name_pattern '{}' has no date/time specifier, every run would render the same branch name",
                pattern
            )));
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    /// Render the branch name for the given instant
    pub fn render<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        at.format(&self.pattern).to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Per-run inputs supplied on the command line
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub token: String,
    pub results_directory: PathBuf,
    pub pattern: String,
    pub title: String,
    pub body: String,
    /// Persistent working copy location; a scratch directory is used when absent
    pub repo_directory: Option<PathBuf>,
    /// Overrides the settings file policy
    pub on_empty: Option<EmptySelectionPolicy>,
}

/// Everything one publish run needs, fully resolved
#[derive(Debug)]
pub struct PublishRequest {
    pub results_directory: PathBuf,
    pub pattern: String,
    pub forked_repo_url: String,
    pub upstream_repo_url: String,
    pub fork: RemoteRepo,
    pub upstream: RemoteRepo,
    pub branch_name: String,
    pub target_branch: String,
    pub results_path: PathBuf,
    pub commit_message: String,
    pub author: Option<Author>,
    pub title: String,
    pub body: String,
    pub credential_token: SecretString,
    pub empty_policy: EmptySelectionPolicy,
    pub repo_directory: Option<PathBuf>,
}

impl PublishRequest {
    /// Combine settings and command line inputs into a validated request
    ///
    /// `now` fixes the branch name for the whole run.
    pub fn resolve<Tz>(settings: &Settings, options: PublishOptions, now: &DateTime<Tz>) -> Result<Self>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        if options.token.trim().is_empty() {
            return Err(UploaderError::Config(
                "GitHub token cannot be empty (use --token or GITHUB_TOKEN)".to_string(),
            ));
        }
        if options.title.trim().is_empty() {
            return Err(UploaderError::Config(
                "pull request title cannot be empty".to_string(),
            ));
        }

        let fork = RemoteRepo::from_url(&settings.forked_repo)?;
        let upstream = RemoteRepo::from_url(&settings.upstream_repo)?;

        let template = BranchNameTemplate::parse(&settings.branch_name_pattern)?;
        let branch_name = template.render(now);
        if !git2::Branch::name_is_valid(&branch_name)? {
            return Err(UploaderError::Config(format!(
                "branch_name_pattern '{}' renders '{}', which is not a valid branch name",
                template.as_str(),
                branch_name
            )));
        }

        let author = match (&settings.author_name, &settings.author_email) {
            (Some(name), Some(email)) => Some(Author {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            results_directory: options.results_directory,
            pattern: options.pattern,
            forked_repo_url: settings.forked_repo.clone(),
            upstream_repo_url: settings.upstream_repo.clone(),
            fork,
            upstream,
            branch_name,
            target_branch: settings.target_branch.clone(),
            results_path: settings.results_path.clone(),
            commit_message: settings.commit_message.clone(),
            author,
            title: options.title,
            body: options.body,
            credential_token: SecretString::from(options.token),
            empty_policy: options.on_empty.unwrap_or(settings.on_empty),
            repo_directory: options.repo_directory,
        })
    }

    /// Pull request description: the user body followed by the published files
    pub fn pull_request_body(&self, staged: &[PathBuf]) -> String {
        let mut body = self.body.trim_end().to_string();
        if staged.is_empty() {
            return body;
        }
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str("Published files:\n");
        for path in staged {
            body.push_str(&format!("- {}\n", display_repo_path(path)));
        }
        body
    }
}

/// Repository paths always use forward slashes
pub(crate) fn display_repo_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
