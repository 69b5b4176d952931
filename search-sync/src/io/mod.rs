//! File I/O for configuration and state snapshots.

pub mod config;
pub mod state_file;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Write `contents` through a sibling temp file and rename it into place.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_files_get_distinct_temp_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let json = temp.path().join("state.json");
        let toml = temp.path().join("state.toml");
        fs::write(json.with_extension("json.tmp"), "stale").expect("seed json temp");

        write_atomic(&json, "{}").expect("write json");
        write_atomic(&toml, "key = 1").expect("write toml");

        assert_eq!(fs::read_to_string(&json).expect("read json"), "{}");
        assert_eq!(fs::read_to_string(&toml).expect("read toml"), "key = 1");
        assert!(!temp.path().join("state.json.tmp").exists());
        assert!(!temp.path().join("state.tmp").exists());
    }
}
