//! Bisect a package's history across commits and released versions.
//!
//! The crate is split the same way throughout:
//!
//! - **[`core`]**: Deterministic logic. The bounded-concurrency
//!   [`core::executor`] schedules independent async tasks and returns one
//!   [`core::outcome::Outcome`] per task in submission order.
//! - **[`io`]**: Side-effecting adapters (git, Docker, GitHub, JSON cache,
//!   subprocesses, progress bars).
//!
//! Orchestration modules ([`commits`], [`test_run`], [`repo_info`],
//! [`statuses`]) turn CLI requests into task batches for the executor.

pub mod commits;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repo_info;
pub mod statuses;
pub mod test_run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
