//! GitHub API error classification
//!
//! Maps octocrab errors onto the uploader's error kinds so the operator can
//! tell a bad token from a duplicate pull request from a network failure.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::UploaderError;

/// GitHub's validation message for a second PR from the same head
static PR_EXISTS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)a pull request already exists")
        .expect("Invalid regex pattern for duplicate pull request detection")
});

/// Classifies an octocrab error into the matching UploaderError
pub fn classify_github_error(err: octocrab::Error) -> UploaderError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            // Validation details live in `errors`, not in `message`
            let details = source
                .errors
                .as_ref()
                .map(|errors| {
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            classify_status(source.status_code.as_u16(), &source.message, &details)
        }
        _ => UploaderError::RemoteAccess(format!("GitHub API request failed: {}", err)),
    }
}

/// Map an API response status and message to an error kind
fn classify_status(status: u16, message: &str, details: &str) -> UploaderError {
    let full_message = if details.is_empty() {
        message.to_string()
    } else {
        format!("{} ({})", message, details)
    };

    match status {
        401 | 403 => UploaderError::Auth(format!("HTTP {}: {}", status, full_message)),
        422 if is_duplicate_pull_request(&full_message) => UploaderError::Conflict(format!(
            "A pull request from this branch already exists: {}",
            full_message
        )),
        _ => UploaderError::RemoteAccess(format!(
            "GitHub API returned HTTP {}: {}",
            status, full_message
        )),
    }
}

fn is_duplicate_pull_request(message: &str) -> bool {
    PR_EXISTS_PATTERN.is_match(message)
}
