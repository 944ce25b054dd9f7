//! Publishing pipeline
//!
//! Runs one publish request through a strictly linear state machine:
//!
//! ```text
//! SELECT → CHECKOUT → BRANCH → STAGE → COMMIT → PUSH → CREATE_PR → DONE
//! ```
//!
//! Any step failing moves the run to FAILED with the originating error, and
//! no later step is attempted. Nothing is retried and nothing already done on
//! a remote is rolled back: a branch pushed before a failed CREATE_PR stays
//! on the fork.

use std::fmt;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::core::git::{BranchCommit, RepositoryClient};
use crate::core::request::{EmptySelectionPolicy, PublishRequest};
use crate::core::selector;
use crate::error::UploaderError;
use crate::github::pull_request::{NewPullRequest, PullRequestClient, PullRequestRecord};

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Select,
    Checkout,
    Branch,
    Stage,
    Commit,
    Push,
    CreatePr,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Select => "SELECT",
            PipelineState::Checkout => "CHECKOUT",
            PipelineState::Branch => "BRANCH",
            PipelineState::Stage => "STAGE",
            PipelineState::Commit => "COMMIT",
            PipelineState::Push => "PUSH",
            PipelineState::CreatePr => "CREATE_PR",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a run that reached DONE
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// No file matched and the policy is to skip
    NothingToPublish,
    /// Files committed, pushed, and proposed upstream
    Published {
        branch: BranchCommit,
        pull_request: PullRequestRecord,
        /// Paths of the published files inside the repository
        files: Vec<PathBuf>,
    },
}

/// A run that reached FAILED
#[derive(Debug, Error)]
#[error("{state} failed: {source}")]
pub struct PublishFailure {
    /// The step that failed
    pub state: PipelineState,
    pub source: UploaderError,
}

impl PublishFailure {
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Drives a publish request through the repository and pull request clients
pub struct Publisher<R, P> {
    repository: R,
    pull_requests: P,
}

impl<R, P> Publisher<R, P>
where
    R: RepositoryClient,
    P: PullRequestClient,
{
    pub fn new(repository: R, pull_requests: P) -> Self {
        Self {
            repository,
            pull_requests,
        }
    }

    /// Run the pipeline to DONE or FAILED
    pub async fn publish(
        &self,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, PublishFailure> {
        enter(PipelineState::Select);
        let files = selector::select(&request.results_directory, &request.pattern)
            .map_err(failed(PipelineState::Select))?;
        tracing::info!(
            "Found {} file(s) matching '{}' in {}",
            files.len(),
            request.pattern,
            request.results_directory.display()
        );

        if files.is_empty() {
            match request.empty_policy {
                EmptySelectionPolicy::Skip => {
                    tracing::info!("No result files matched, nothing to publish");
                    enter(PipelineState::Done);
                    return Ok(PublishOutcome::NothingToPublish);
                }
                EmptySelectionPolicy::Attempt => {
                    tracing::warn!("No result files matched, continuing as configured");
                }
            }
        }

        enter(PipelineState::Checkout);
        let copy = self
            .repository
            .open_or_clone(&request.forked_repo_url)
            .map_err(failed(PipelineState::Checkout))?;

        enter(PipelineState::Branch);
        self.repository
            .create_branch(&copy, &request.branch_name)
            .map_err(failed(PipelineState::Branch))?;

        enter(PipelineState::Stage);
        let staged = self
            .repository
            .stage(&copy, &files)
            .map_err(failed(PipelineState::Stage))?;

        enter(PipelineState::Commit);
        self.repository
            .commit(&copy, &request.commit_message, request.author.clone())
            .map_err(failed(PipelineState::Commit))?;

        enter(PipelineState::Push);
        let branch = self
            .repository
            .push(&copy, &request.branch_name)
            .map_err(failed(PipelineState::Push))?;
        drop(copy);

        enter(PipelineState::CreatePr);
        let new_pr = NewPullRequest {
            upstream: request.upstream.clone(),
            fork: request.fork.clone(),
            branch_name: request.branch_name.clone(),
            base: request.target_branch.clone(),
            title: request.title.clone(),
            body: request.pull_request_body(&staged),
            credential_token: SecretString::from(
                request.credential_token.expose_secret().to_string(),
            ),
        };
        let pull_request = self
            .pull_requests
            .create_pull_request(&new_pr)
            .await
            .map_err(failed(PipelineState::CreatePr))?;

        enter(PipelineState::Done);
        Ok(PublishOutcome::Published {
            branch,
            pull_request,
            files: staged,
        })
    }
}

fn enter(state: PipelineState) {
    tracing::debug!(state = %state, "Entering pipeline state");
}

fn failed(state: PipelineState) -> impl FnOnce(UploaderError) -> PublishFailure {
    move |source| {
        tracing::error!(
            state = %state,
            kind = source.kind(),
            "Pipeline {}: {}",
            PipelineState::Failed,
            source
        );
        PublishFailure { state, source }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::{TimeZone, Utc};
    use mockall::Sequence;
    use tempfile::TempDir;

    use super::*;
    use crate::core::config::Settings;
    use crate::core::git::{MockRepositoryClient, WorkingCopy};
    use crate::core::request::PublishOptions;
    use crate::github::pull_request::MockPullRequestClient;

    const BRANCH: &str = "results-20240517123000";

    fn request(results: &Path, policy: EmptySelectionPolicy) -> PublishRequest {
        let settings = Settings::from_ini_str(
            "[uploader]\n\
             forked_repo = git@github.com:me/results.git\n\
             upstream_repo = https://github.com/org/results\n",
        )
        .unwrap();
        let options = PublishOptions {
            token: "ghp_secret".to_string(),
            results_directory: results.to_path_buf(),
            pattern: "*.json".to_string(),
            title: "New results".to_string(),
            body: "Nightly run".to_string(),
            repo_directory: None,
            on_empty: Some(policy),
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap();
        PublishRequest::resolve(&settings, options, &now).unwrap()
    }

    fn results_dir(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        dir
    }

    fn branch_commit() -> BranchCommit {
        BranchCommit {
            branch_name: BRANCH.to_string(),
            remote_ref: format!("refs/heads/{}", BRANCH),
            commit_id: "abc123".to_string(),
        }
    }

    /// Repository mock whose steps up to (not including) `until` succeed
    fn repository_until(until: PipelineState) -> MockRepositoryClient {
        let mut repo = MockRepositoryClient::new();
        repo.expect_open_or_clone()
            .times(1)
            .returning(|_| Ok(WorkingCopy::persistent("/tmp/fake-working-copy")));
        if until == PipelineState::Branch {
            return repo;
        }
        repo.expect_create_branch()
            .withf(|_, name| name == BRANCH)
            .times(1)
            .returning(|_, _| Ok(()));
        if until == PipelineState::Stage {
            return repo;
        }
        repo.expect_stage()
            .times(1)
            .returning(|_, files| {
                Ok(files
                    .files()
                    .iter()
                    .map(|f| PathBuf::from("results").join(files.relative_path(f).unwrap()))
                    .collect())
            });
        if until == PipelineState::Commit {
            return repo;
        }
        repo.expect_commit()
            .times(1)
            .returning(|_, _, _| Ok("abc123".to_string()));
        if until == PipelineState::Push {
            return repo;
        }
        repo.expect_push()
            .times(1)
            .returning(|_, _| Ok(branch_commit()));
        repo
    }

    #[tokio::test]
    async fn test_publish_success() {
        let dir = results_dir(&["a.json", "b.json", "c.txt"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut seq = Sequence::new();
        let mut repo = MockRepositoryClient::new();
        repo.expect_open_or_clone()
            .withf(|url| url == "git@github.com:me/results.git")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(WorkingCopy::persistent("/tmp/fake-working-copy")));
        repo.expect_create_branch()
            .withf(|_, name| name == BRANCH)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        repo.expect_stage()
            .withf(|_, files| files.len() == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(vec![
                    PathBuf::from("results/a.json"),
                    PathBuf::from("results/b.json"),
                ])
            });
        repo.expect_commit()
            .withf(|_, message, author| message == "Add new results files" && author.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("abc123".to_string()));
        repo.expect_push()
            .withf(|_, name| name == BRANCH)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(branch_commit()));

        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request()
            .withf(|pr| {
                pr.head() == format!("me:{}", BRANCH)
                    && pr.base == "main"
                    && pr.upstream.full_name() == "org/results"
                    && pr.title == "New results"
                    && pr.body.contains("- results/a.json")
            })
            .times(1)
            .returning(|_| {
                Ok(PullRequestRecord {
                    number: 42,
                    url: "https://github.com/org/results/pull/42".to_string(),
                })
            });

        let outcome = Publisher::new(repo, prs).publish(&request).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                branch: branch_commit(),
                pull_request: PullRequestRecord {
                    number: 42,
                    url: "https://github.com/org/results/pull/42".to_string(),
                },
                files: vec![
                    PathBuf::from("results/a.json"),
                    PathBuf::from("results/b.json")
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_skip_empty_makes_no_remote_calls() {
        let dir = results_dir(&[]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut repo = MockRepositoryClient::new();
        repo.expect_open_or_clone().never();
        repo.expect_create_branch().never();
        repo.expect_stage().never();
        repo.expect_commit().never();
        repo.expect_push().never();
        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request().never();

        let outcome = Publisher::new(repo, prs).publish(&request).await.unwrap();
        assert_eq!(outcome, PublishOutcome::NothingToPublish);
    }

    #[tokio::test]
    async fn test_attempt_empty_fails_at_commit() {
        let dir = results_dir(&["only.txt"]);
        let request = request(dir.path(), EmptySelectionPolicy::Attempt);

        let mut repo = repository_until(PipelineState::Commit);
        repo.expect_commit()
            .times(1)
            .returning(|_, _, _| Err(UploaderError::NothingToCommit));
        repo.expect_push().never();
        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request().never();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Commit);
        assert_eq!(failure.kind(), "NothingToCommitError");
    }

    #[tokio::test]
    async fn test_missing_results_directory_fails_at_select() {
        let dir = results_dir(&[]);
        let request = request(&dir.path().join("missing"), EmptySelectionPolicy::Skip);

        let mut repo = MockRepositoryClient::new();
        repo.expect_open_or_clone().never();
        let prs = MockPullRequestClient::new();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Select);
        assert_eq!(failure.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_clone_failure_stops_pipeline() {
        let dir = results_dir(&["a.json"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut repo = MockRepositoryClient::new();
        repo.expect_open_or_clone()
            .times(1)
            .returning(|_| Err(UploaderError::RemoteAccess("permission denied".into())));
        repo.expect_create_branch().never();
        let prs = MockPullRequestClient::new();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Checkout);
        assert_eq!(failure.kind(), "RemoteAccessError");
    }

    #[tokio::test]
    async fn test_branch_conflict_stops_pipeline() {
        let dir = results_dir(&["a.json"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut repo = repository_until(PipelineState::Branch);
        repo.expect_create_branch()
            .times(1)
            .returning(|_, name| Err(UploaderError::Conflict(format!("{} exists", name))));
        repo.expect_stage().never();
        let prs = MockPullRequestClient::new();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Branch);
        assert_eq!(failure.kind(), "ConflictError");
    }

    #[tokio::test]
    async fn test_stage_failure_never_commits() {
        let dir = results_dir(&["a.json", "b.json"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut repo = repository_until(PipelineState::Stage);
        repo.expect_stage().times(1).returning(|_, _| {
            Err(UploaderError::Io {
                path: PathBuf::from("b.json"),
                staged: 1,
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        });
        repo.expect_commit().never();
        repo.expect_push().never();
        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request().never();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Stage);
        assert_eq!(failure.kind(), "IOError");
    }

    #[tokio::test]
    async fn test_push_failure_never_creates_pull_request() {
        let dir = results_dir(&["a.json"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        let mut repo = repository_until(PipelineState::Push);
        repo.expect_push().times(1).returning(|_, _| {
            Err(UploaderError::Conflict(
                "The fork rejected the push: non-fast-forward".into(),
            ))
        });
        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request().never();

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::Push);
        assert_eq!(failure.kind(), "ConflictError");
    }

    #[tokio::test]
    async fn test_rejected_token_fails_after_push() {
        let dir = results_dir(&["a.json"]);
        let request = request(dir.path(), EmptySelectionPolicy::Skip);

        // Push still happens exactly once; the branch stays on the fork
        let repo = repository_until(PipelineState::CreatePr);
        let mut prs = MockPullRequestClient::new();
        prs.expect_create_pull_request()
            .times(1)
            .returning(|_| Err(UploaderError::Auth("HTTP 401: Bad credentials".into())));

        let failure = Publisher::new(repo, prs)
            .publish(&request)
            .await
            .unwrap_err();
        assert_eq!(failure.state, PipelineState::CreatePr);
        assert_eq!(failure.kind(), "AuthError");
        assert!(failure.to_string().starts_with("CREATE_PR failed"));
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(PublishOutcome::NothingToPublish).unwrap();
        assert_eq!(json, serde_json::json!({"status": "nothing_to_publish"}));
    }
}
