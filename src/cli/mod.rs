//! CLI module for results-uploader
//!
//! Argument definitions and the publish command handler.

pub mod commands;
pub mod publish;
