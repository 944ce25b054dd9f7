//! Core publishing logic
//!
//! This module contains:
//! - Settings loading and request resolution
//! - Result file selection
//! - Working copy operations on the fork
//! - The publishing pipeline

pub mod config;
pub mod git;
pub mod publisher;
pub mod repository;
pub mod request;
pub mod selector;

pub use config::Settings;
pub use git::{BranchCommit, GitRepositoryClient, RepositoryClient, WorkingCopy};
pub use publisher::{PipelineState, PublishFailure, PublishOutcome, Publisher};
pub use repository::RemoteRepo;
pub use request::{EmptySelectionPolicy, PublishOptions, PublishRequest};
pub use selector::{select, SelectedFileSet};
