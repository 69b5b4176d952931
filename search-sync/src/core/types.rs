//! Shared data model for search state.
//!
//! These types are the stable contract between the synchronizer, its
//! collaborators, and the serialized state files. JSON field names follow the
//! dashboard wire format (camelCase, `$state` on filters).

use serde::{Deserialize, Serialize};

use crate::core::filters::Filter;

/// `timeRestore` value used when the owner never set one.
pub const DEFAULT_TIME_RESTORE: bool = false;

/// Free-text or structured search expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query: String,
    pub language: String,
}

impl Query {
    pub fn new(query: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRangeMode {
    Absolute,
    Relative,
}

/// Start/end of the visible time window.
///
/// `from`/`to` are either absolute timestamps or relative expressions such as
/// `now-15m`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TimeRangeMode>,
}

impl TimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            mode: None,
        }
    }
}

/// Auto-refresh cadence. `value` is in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshInterval {
    pub pause: bool,
    pub value: u64,
}

/// Sub-range highlight inside the time range, as `[start, end]` epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlice(pub i64, pub i64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EsqlValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsqlVariableType {
    TimeLiteral,
    Fields,
    Values,
    Functions,
    MultiValues,
}

/// Named query-language variable contributed by the control group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsqlVariable {
    pub key: String,
    pub value: EsqlValue,
    #[serde(rename = "type")]
    pub kind: EsqlVariableType,
}

/// Persisted slice of dashboard state owned by the synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<RefreshInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restore: Option<bool>,
}

/// The four fields that take part in unsaved-change detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparableState {
    pub filters: Option<Vec<Filter>>,
    pub query: Option<Query>,
    pub refresh_interval: Option<RefreshInterval>,
    pub time_range: Option<TimeRange>,
}

/// Global (cross-application) state stored in the URL under the global key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalQueryState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<RefreshInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
}

/// Query plus filters, as exchanged with the query service.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub query: Query,
    pub filters: Vec<Filter>,
}
