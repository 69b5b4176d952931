//! Stable exit codes for `search-sync` commands.

/// Command succeeded; for `diff`, the state is clean.
pub const OK: i32 = 0;
/// Invalid config, unreadable state file, or any other error.
pub const INVALID: i32 = 1;
/// `search-sync diff` found unsaved changes.
pub const DIRTY: i32 = 2;
