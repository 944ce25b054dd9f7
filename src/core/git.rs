//! Working copy operations on the forked repository
//!
//! Network operations (clone, fetch, ls-remote, push) go through the system
//! `git` binary so SSH agents and credential helpers keep working. Local
//! operations (branching, the index, commits) use git2 directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use git2::build::CheckoutBuilder;
use git2::{BranchType, Repository, Signature, StatusOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tempfile::TempDir;

use crate::core::request::{Author, PublishRequest};
use crate::core::selector::SelectedFileSet;
use crate::error::{Result, UploaderError};

/// Name of the remote pointing at the upstream repository
const UPSTREAM_REMOTE: &str = "upstream";

/// Name of the remote pointing at the fork
const FORK_REMOTE: &str = "origin";

/// Identity used when neither the settings nor git config provide one
const FALLBACK_AUTHOR: (&str, &str) = ("results-uploader", "results-uploader@localhost");

/// git's wording when a push is refused because the remote branch moved
static PUSH_REJECTED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[rejected\]|non-fast-forward|fetch first|already exists")
        .expect("Invalid regex pattern for push rejection detection")
});

/// Local checkout of the fork used for one publish run
///
/// Scratch copies live in a temporary directory that is removed when the
/// working copy is dropped.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl WorkingCopy {
    /// A working copy that outlives the run
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch: None,
        }
    }

    fn scratch(dir: TempDir, path: PathBuf) -> Self {
        Self {
            path,
            scratch: Some(dir),
        }
    }

    /// Root of the checkout
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    fn open(&self) -> Result<Repository> {
        Ok(Repository::open(&self.path)?)
    }
}

/// A branch pushed to the fork
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchCommit {
    pub branch_name: String,
    /// Fully qualified ref on the fork
    pub remote_ref: String,
    pub commit_id: String,
}

/// Version-control operations the publisher needs
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryClient {
    /// Open the configured working copy or clone the fork
    fn open_or_clone(&self, forked_repo_url: &str) -> Result<WorkingCopy>;

    /// Create the results branch and check it out
    fn create_branch(&self, copy: &WorkingCopy, branch_name: &str) -> Result<()>;

    /// Copy the selected files into the working copy and add them to the index
    ///
    /// Returns the staged paths relative to the working copy root.
    fn stage(&self, copy: &WorkingCopy, files: &SelectedFileSet) -> Result<Vec<PathBuf>>;

    /// Commit the index, returning the new commit id
    fn commit(&self, copy: &WorkingCopy, message: &str, author: Option<Author>) -> Result<String>;

    /// Push the branch to the fork
    fn push(&self, copy: &WorkingCopy, branch_name: &str) -> Result<BranchCommit>;
}

/// Repository client backed by git2 and the system git binary
#[derive(Debug, Clone)]
pub struct GitRepositoryClient {
    upstream_url: String,
    target_branch: String,
    results_path: PathBuf,
    repo_directory: Option<PathBuf>,
}

impl GitRepositoryClient {
    pub fn new(
        upstream_url: impl Into<String>,
        target_branch: impl Into<String>,
        results_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            target_branch: target_branch.into(),
            results_path: results_path.into(),
            repo_directory: None,
        }
    }

    /// Build a client for the given request
    pub fn from_request(request: &PublishRequest) -> Self {
        Self::new(
            request.upstream_repo_url.clone(),
            request.target_branch.clone(),
            request.results_path.clone(),
        )
        .with_repo_directory(request.repo_directory.clone())
    }

    /// Use a persistent working copy at `dir` instead of a scratch clone
    pub fn with_repo_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.repo_directory = dir;
        self
    }

    fn ensure_upstream_remote(&self, repo: &Repository) -> Result<()> {
        match repo.find_remote(UPSTREAM_REMOTE) {
            Ok(remote) => {
                let url = remote.url().unwrap_or_default();
                if url != self.upstream_url {
                    return Err(UploaderError::Config(format!(
                        "remote '{}' already points at {} but upstream_repo is {}",
                        UPSTREAM_REMOTE, url, self.upstream_url
                    )));
                }
                tracing::info!("Found upstream remote {}", url);
            }
            Err(_) => {
                tracing::info!("Adding upstream remote {}", self.upstream_url);
                repo.remote(UPSTREAM_REMOTE, &self.upstream_url)?;
            }
        }
        Ok(())
    }

    fn remote_branch_exists(&self, copy: &WorkingCopy, branch_name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", branch_name);
        let output = run_git(
            Some(copy.path()),
            &["ls-remote", "--exit-code", "--heads", FORK_REMOTE, &refname],
        )?;

        match output.status.code() {
            Some(0) => Ok(true),
            // --exit-code reports "no matching refs" as 2
            Some(2) => Ok(false),
            _ => Err(UploaderError::RemoteAccess(git_failure("ls-remote", &output))),
        }
    }
}

impl RepositoryClient for GitRepositoryClient {
    fn open_or_clone(&self, forked_repo_url: &str) -> Result<WorkingCopy> {
        let copy = match &self.repo_directory {
            Some(dir) if dir.exists() => {
                if !dir.is_dir() {
                    return Err(UploaderError::Config(format!(
                        "repository directory is not a directory: {}",
                        dir.display()
                    )));
                }
                Repository::open(dir).map_err(|_| {
                    UploaderError::Config(format!(
                        "not a valid git repository: {}",
                        dir.display()
                    ))
                })?;
                tracing::info!("Using working copy {}", dir.display());
                WorkingCopy::persistent(dir)
            }
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| UploaderError::io(dir, e))?;
                clone_into(forked_repo_url, dir)?;
                WorkingCopy::persistent(dir)
            }
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("results-uploader-")
                    .tempdir()
                    .map_err(|e| UploaderError::io(std::env::temp_dir(), e))?;
                let path = scratch.path().join("fork");
                clone_into(forked_repo_url, &path)?;
                WorkingCopy::scratch(scratch, path)
            }
        };

        let repo = copy.open()?;
        self.ensure_upstream_remote(&repo)?;

        tracing::info!("Fetching {}/{}", UPSTREAM_REMOTE, self.target_branch);
        let output = run_git(
            Some(copy.path()),
            &["fetch", UPSTREAM_REMOTE, &self.target_branch],
        )?;
        if !output.status.success() {
            return Err(UploaderError::RemoteAccess(git_failure("fetch", &output)));
        }

        Ok(copy)
    }

    fn create_branch(&self, copy: &WorkingCopy, branch_name: &str) -> Result<()> {
        let repo = copy.open()?;

        if repo.find_branch(branch_name, BranchType::Local).is_ok() {
            return Err(UploaderError::Conflict(format!(
                "Branch '{}' already exists in the working copy.",
                branch_name
            )));
        }
        if self.remote_branch_exists(copy, branch_name)? {
            return Err(UploaderError::Conflict(format!(
                "Branch '{}' already exists on the fork.",
                branch_name
            )));
        }

        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        if !repo.statuses(Some(&mut opts))?.is_empty() {
            return Err(UploaderError::Conflict(format!(
                "Working copy {} has uncommitted changes.",
                copy.path().display()
            )));
        }

        let base_ref = format!("refs/remotes/{}/{}", UPSTREAM_REMOTE, self.target_branch);
        let base = repo
            .find_reference(&base_ref)
            .and_then(|r| r.peel_to_commit())
            .map_err(|_| {
                UploaderError::Config(format!(
                    "target branch '{}' not found on upstream",
                    self.target_branch
                ))
            })?;

        tracing::info!(
            "Creating branch {} from {}/{}",
            branch_name,
            UPSTREAM_REMOTE,
            self.target_branch
        );
        repo.branch(branch_name, &base, false)?;
        repo.checkout_tree(base.as_object(), Some(CheckoutBuilder::new().safe()))?;
        repo.set_head(&format!("refs/heads/{}", branch_name))?;

        Ok(())
    }

    fn stage(&self, copy: &WorkingCopy, files: &SelectedFileSet) -> Result<Vec<PathBuf>> {
        let repo = copy.open()?;
        let mut index = repo.index()?;
        let mut staged: Vec<PathBuf> = Vec::with_capacity(files.len());

        for file in files.files() {
            let stage_err = |source: std::io::Error| UploaderError::Io {
                path: file.clone(),
                staged: staged.len(),
                source,
            };

            let Some(inner) = files.relative_path(file) else {
                return Err(stage_err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("not under {}", files.root().display()),
                )));
            };
            let relative = self.results_path.join(inner);
            if staged.contains(&relative) {
                return Err(stage_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} is already staged from another file", relative.display()),
                )));
            }

            let dest = copy.path().join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(stage_err)?;
            }
            fs::copy(file, &dest).map_err(stage_err)?;
            tracing::info!("Copied {} to {}", file.display(), dest.display());

            index.add_path(&relative)?;
            staged.push(relative);
        }

        index.write()?;
        Ok(staged)
    }

    fn commit(&self, copy: &WorkingCopy, message: &str, author: Option<Author>) -> Result<String> {
        let repo = copy.open()?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let parent = repo.head()?.peel_to_commit()?;

        if parent.tree_id() == tree_id {
            return Err(UploaderError::NothingToCommit);
        }
        let tree = repo.find_tree(tree_id)?;

        let signature = match author {
            Some(author) => Signature::now(&author.name, &author.email)?,
            None => repo
                .signature()
                .or_else(|_| Signature::now(FALLBACK_AUTHOR.0, FALLBACK_AUTHOR.1))?,
        };

        let commit_id = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?;
        tracing::info!("Added commit {}: {}", commit_id, message);

        Ok(commit_id.to_string())
    }

    fn push(&self, copy: &WorkingCopy, branch_name: &str) -> Result<BranchCommit> {
        let remote_ref = format!("refs/heads/{}", branch_name);
        let refspec = format!("{0}:{0}", remote_ref);

        tracing::info!("Pushing {} to {}", branch_name, FORK_REMOTE);
        let output = run_git(Some(copy.path()), &["push", FORK_REMOTE, &refspec])?;
        if !output.status.success() {
            return Err(classify_push_failure(&output));
        }

        let repo = copy.open()?;
        let commit = repo.find_reference(&remote_ref)?.peel_to_commit()?;

        Ok(BranchCommit {
            branch_name: branch_name.to_string(),
            remote_ref,
            commit_id: commit.id().to_string(),
        })
    }
}

fn clone_into(url: &str, dest: &Path) -> Result<()> {
    tracing::info!("Cloning {} to {}", url, dest.display());
    let dest = dest.to_string_lossy();
    let output = run_git(None, &["clone", "--single-branch", url, &dest])?;
    if !output.status.success() {
        return Err(UploaderError::RemoteAccess(git_failure("clone", &output)));
    }
    Ok(())
}

/// Run system git, never prompting for credentials
fn run_git(workdir: Option<&Path>, args: &[&str]) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    cmd.output().map_err(|e| {
        UploaderError::RemoteAccess(format!("failed to execute git {}: {}", args[0], e))
    })
}

fn git_failure(operation: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("git {} failed: {}", operation, stderr.trim())
}

fn classify_push_failure(output: &Output) -> UploaderError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if PUSH_REJECTED_PATTERN.is_match(&stderr) {
        UploaderError::Conflict(format!(
            "The fork rejected the push: {}",
            stderr.trim()
        ))
    } else {
        UploaderError::RemoteAccess(git_failure("push", output))
    }
}
