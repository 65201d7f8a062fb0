//! Stable exit codes for tramp CLI commands.

/// Command succeeded; a replay drained its queue.
pub const OK: i32 = 0;
/// Invalid configuration, unreadable session files or other errors.
pub const INVALID: i32 = 1;
/// `tramp replay` ended before the queue was drained.
pub const INCOMPLETE: i32 = 2;
/// `tramp replay` gave up after too many fatal recoveries.
pub const UNSTABLE: i32 = 3;
