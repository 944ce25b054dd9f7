//! Pull request creation

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

use crate::core::repository::RemoteRepo;
use crate::error::Result;
use crate::github::client::build_client;

/// Parameters for opening a pull request from the fork into upstream
#[derive(Debug)]
pub struct NewPullRequest {
    /// Repository receiving the pull request
    pub upstream: RemoteRepo,
    /// Repository holding the pushed branch
    pub fork: RemoteRepo,
    pub branch_name: String,
    /// Upstream branch to merge into
    pub base: String,
    pub title: String,
    pub body: String,
    pub credential_token: SecretString,
}

impl NewPullRequest {
    /// Cross-repository head reference (`owner:branch`)
    pub fn head(&self) -> String {
        format!("{}:{}", self.fork.owner, self.branch_name)
    }
}

/// The pull request GitHub created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub url: String,
}

/// Code-hosting operations the publisher needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullRequestClient {
    /// Open exactly one pull request; never retried
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestRecord>;
}

/// Pull request client backed by the GitHub REST API
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubPullRequestClient;

impl GitHubPullRequestClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PullRequestClient for GitHubPullRequestClient {
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestRecord> {
        let octocrab = build_client(&request.credential_token)?;
        let head = request.head();

        tracing::info!(
            "Creating pull request from {} into {}:{}",
            head,
            request.upstream,
            request.base
        );

        let pr = octocrab
            .pulls(&request.upstream.owner, &request.upstream.name)
            .create(&request.title, &head, &request.base)
            .body(&request.body)
            .send()
            .await?;

        let url = pr.html_url.map(|u| u.to_string()).unwrap_or_else(|| {
            format!(
                "https://github.com/{}/pull/{}",
                request.upstream.full_name(),
                pr.number
            )
        });
        tracing::info!("Pull request created: {}", url);

        Ok(PullRequestRecord {
            number: pr.number,
            url,
        })
    }
}
