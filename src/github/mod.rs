//! GitHub API integration
//!
//! - Client construction from a bearer token
//! - Pull request creation
//! - Error classification

pub mod client;
pub mod error_handler;
pub mod pull_request;

pub use client::build_client;
pub use error_handler::classify_github_error;
pub use pull_request::{
    GitHubPullRequestClient, NewPullRequest, PullRequestClient, PullRequestRecord,
};
