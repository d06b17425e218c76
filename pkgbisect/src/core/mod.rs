//! Deterministic logic shared by the bisect commands.
//!
//! Core modules must be free of I/O side effects. The executor only polls the
//! futures it is handed; everything that touches git, Docker, or the network
//! lives in [`crate::io`].

pub mod executor;
pub mod outcome;
pub mod types;
pub mod versions;
