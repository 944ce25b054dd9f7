//! results-uploader - publish test results as a pull request
//!
//! Selects result files from a local directory, commits them to a fresh
//! branch on a fork, pushes the branch, and opens a pull request against
//! the upstream repository.

pub mod cli;
pub mod core;
pub mod error;
pub mod github;

pub use error::{Result, UploaderError};
