//! Stable exit codes for the CLI.

/// Every task succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, or an error outside any task.
pub const INVALID: i32 = 1;
/// The batch finished but at least one task failed (or a test run failed).
pub const PARTIAL: i32 = 2;
/// Interrupted by Ctrl-C; unfinished tasks were cancelled.
pub const INTERRUPTED: i32 = 130;
