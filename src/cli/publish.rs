//! Publish command handler

use chrono::Local;

use crate::cli::commands::Cli;
use crate::core::config::Settings;
use crate::core::git::GitRepositoryClient;
use crate::core::publisher::{PublishFailure, PublishOutcome, Publisher};
use crate::core::request::PublishRequest;
use crate::error::Result;
use crate::github::GitHubPullRequestClient;

/// Load the settings file and resolve the request for this run
pub fn load_request(cli: &Cli) -> Result<PublishRequest> {
    let settings = Settings::load(&cli.config)?;
    let request = PublishRequest::resolve(&settings, cli.publish_options(), &Local::now())?;

    tracing::info!(
        "Publishing to {} via {} on branch {}",
        request.upstream,
        request.fork,
        request.branch_name
    );
    Ok(request)
}

/// Run the pipeline with the git and GitHub backed clients
pub async fn handle_publish(
    request: &PublishRequest,
) -> std::result::Result<PublishOutcome, PublishFailure> {
    let publisher = Publisher::new(
        GitRepositoryClient::from_request(request),
        GitHubPullRequestClient::new(),
    );
    publisher.publish(request).await
}

/// Print the outcome of a successful run on stdout
pub fn print_outcome(outcome: &PublishOutcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!("Cannot serialize outcome: {}", e),
        }
        return;
    }

    match outcome {
        PublishOutcome::NothingToPublish => {
            println!("No result files matched, nothing to publish.");
        }
        PublishOutcome::Published {
            branch,
            pull_request,
            files,
        } => {
            println!(
                "✓ Pushed {} file(s) to branch {}",
                files.len(),
                branch.branch_name
            );
            println!(
                "✓ Created pull request #{}: {}",
                pull_request.number, pull_request.url
            );
        }
    }
}
