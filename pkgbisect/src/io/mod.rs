//! I/O adapters for bisect commands.

pub mod cache;
pub mod config;
pub mod docker;
pub mod git;
pub mod github;
pub mod process;
pub mod progress;
