//! Synchronizer configuration stored in `search-sync.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{Query, RefreshInterval, TimeRange};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "search-sync.toml";

/// Synchronizer configuration (TOML).
///
/// Missing fields default to the dashboard's stock behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchSyncConfig {
    /// Quiet period before live state is compared with the saved state.
    pub comparison_debounce_ms: u64,

    /// Quiet period before query/filter changes are pushed to the query
    /// service. Zero coalesces same-tick changes.
    pub url_sync_debounce_ms: u64,

    /// URL key holding global (cross-app) state.
    pub global_state_key: String,

    /// Language of the query used when none is set.
    pub default_query_language: String,

    pub time_defaults: TimeDefaults,

    pub refresh_interval_defaults: RefreshDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeDefaults {
    pub from: String,
    pub to: String,
}

impl Default for TimeDefaults {
    fn default() -> Self {
        Self {
            from: "now-15m".to_string(),
            to: "now".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshDefaults {
    pub pause: bool,
    /// Milliseconds.
    pub value: u64,
}

impl Default for RefreshDefaults {
    fn default() -> Self {
        Self {
            pause: true,
            value: 60_000,
        }
    }
}

impl Default for SearchSyncConfig {
    fn default() -> Self {
        Self {
            comparison_debounce_ms: 100,
            url_sync_debounce_ms: 0,
            global_state_key: "_g".to_string(),
            default_query_language: "kuery".to_string(),
            time_defaults: TimeDefaults::default(),
            refresh_interval_defaults: RefreshDefaults::default(),
        }
    }
}

impl SearchSyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.global_state_key.trim().is_empty() {
            return Err(anyhow!("global_state_key must be non-empty"));
        }
        if self.default_query_language.trim().is_empty() {
            return Err(anyhow!("default_query_language must be non-empty"));
        }
        if self.time_defaults.from.trim().is_empty() || self.time_defaults.to.trim().is_empty() {
            return Err(anyhow!("time_defaults.from and time_defaults.to must be non-empty"));
        }
        if self.refresh_interval_defaults.value == 0 {
            return Err(anyhow!("refresh_interval_defaults.value must be > 0"));
        }
        Ok(())
    }

    pub fn comparison_debounce(&self) -> Duration {
        Duration::from_millis(self.comparison_debounce_ms)
    }

    pub fn url_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.url_sync_debounce_ms)
    }

    pub fn default_time_range(&self) -> TimeRange {
        TimeRange::new(&self.time_defaults.from, &self.time_defaults.to)
    }

    pub fn default_refresh_interval(&self) -> RefreshInterval {
        RefreshInterval {
            pause: self.refresh_interval_defaults.pause,
            value: self.refresh_interval_defaults.value,
        }
    }

    pub fn default_query(&self) -> Query {
        Query::new("", &self.default_query_language)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SearchSyncConfig::default()`.
pub fn load_config(path: &Path) -> Result<SearchSyncConfig> {
    if !path.exists() {
        let cfg = SearchSyncConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SearchSyncConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SearchSyncConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SearchSyncConfig::default());
        assert_eq!(cfg.comparison_debounce(), Duration::from_millis(100));
        assert_eq!(cfg.url_sync_debounce(), Duration::ZERO);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("search-sync.toml");
        let cfg = SearchSyncConfig {
            comparison_debounce_ms: 250,
            ..SearchSyncConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("search-sync.toml");
        fs::write(&path, "[time_defaults]\nfrom = \"now-24h\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.default_time_range(), TimeRange::new("now-24h", "now"));
        assert_eq!(cfg.global_state_key, "_g");
    }

    #[test]
    fn validate_rejects_empty_key_and_zero_refresh() {
        let cfg = SearchSyncConfig {
            global_state_key: " ".to_string(),
            ..SearchSyncConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = SearchSyncConfig::default();
        cfg.refresh_interval_defaults.value = 0;
        assert!(cfg.validate().is_err());
    }
}
