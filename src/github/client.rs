//! GitHub API client construction using octocrab

use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, UploaderError};

/// Build an octocrab instance authenticated with a bearer token
///
/// Automatic retries are disabled: a retried pull request creation can
/// open a duplicate pull request.
pub fn build_client(token: &SecretString) -> Result<Octocrab> {
    if token.expose_secret().trim().is_empty() {
        return Err(UploaderError::Auth("no token provided".to_string()));
    }

    let octocrab = Octocrab::builder()
        .personal_token(token.expose_secret().to_string())
        .add_retry_config(RetryConfig::None)
        .build()?;

    Ok(octocrab)
}
