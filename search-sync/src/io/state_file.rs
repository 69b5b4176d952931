//! Search state snapshots stored as JSON files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::SearchState;

/// Load a search state snapshot.
pub fn load_state(path: &Path) -> Result<SearchState> {
    debug!(path = %path.display(), "loading search state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: SearchState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(
        filters = state.filters.as_ref().map_or(0, Vec::len),
        time_restore = ?state.time_restore,
        "search state loaded"
    );
    Ok(state)
}

/// Atomically write a search state snapshot (temp file + rename).
pub fn write_state(path: &Path, state: &SearchState) -> Result<()> {
    debug!(path = %path.display(), "writing search state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize search state")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
