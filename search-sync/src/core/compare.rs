//! Field-by-field comparison of live search state against the last saved one.

use serde::Serialize;

use crate::core::filters::{Filter, compare_filters, strip_pinned};
use crate::core::time::are_times_equal;
use crate::core::types::{ComparableState, Query, RefreshInterval, SearchState, TimeRange};

/// Which comparable fields differ from the saved snapshot (`true` = differs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDiff {
    pub filters: bool,
    pub query: bool,
    pub refresh_interval: bool,
    pub time_range: bool,
}

impl StateDiff {
    pub fn is_dirty(&self) -> bool {
        self.filters || self.query || self.refresh_interval || self.time_range
    }

    /// Names of the differing fields, in wire-format spelling.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            (self.filters, "filters"),
            (self.query, "query"),
            (self.refresh_interval, "refreshInterval"),
            (self.time_range, "timeRange"),
        ]
        .into_iter()
        .filter_map(|(changed, name)| changed.then_some(name))
        .collect()
    }
}

pub fn filters_equal(a: Option<&[Filter]>, b: Option<&[Filter]>) -> bool {
    let a = strip_pinned(a.unwrap_or_default());
    let b = strip_pinned(b.unwrap_or_default());
    compare_filters(&a, &b)
}

pub fn query_equal(a: Option<&Query>, b: Option<&Query>) -> bool {
    a == b
}

/// Refresh interval only counts when time restore is on.
pub fn refresh_interval_equal(
    a: Option<&RefreshInterval>,
    b: Option<&RefreshInterval>,
    time_restore: bool,
) -> bool {
    !time_restore || a == b
}

/// Time range only counts when time restore is on.
pub fn time_range_equal(a: Option<&TimeRange>, b: Option<&TimeRange>, time_restore: bool) -> bool {
    if !time_restore {
        return true;
    }
    are_times_equal(a.map(|t| t.from.as_str()), b.map(|t| t.from.as_str()))
        && are_times_equal(a.map(|t| t.to.as_str()), b.map(|t| t.to.as_str()))
}

/// Diff `latest` against `saved` using the per-field comparators.
pub fn diff_state(saved: &SearchState, latest: &ComparableState, time_restore: bool) -> StateDiff {
    StateDiff {
        filters: !filters_equal(saved.filters.as_deref(), latest.filters.as_deref()),
        query: !query_equal(saved.query.as_ref(), latest.query.as_ref()),
        refresh_interval: !refresh_interval_equal(
            saved.refresh_interval.as_ref(),
            latest.refresh_interval.as_ref(),
            time_restore,
        ),
        time_range: !time_range_equal(
            saved.time_range.as_ref(),
            latest.time_range.as_ref(),
            time_restore,
        ),
    }
}

impl From<&SearchState> for ComparableState {
    fn from(state: &SearchState) -> Self {
        ComparableState {
            filters: state.filters.clone(),
            query: state.query.clone(),
            refresh_interval: state.refresh_interval,
            time_range: state.time_range.clone(),
        }
    }
}
