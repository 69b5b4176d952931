//! Pure state transitions used by the synchronizer.

use crate::core::filters::{Filter, pinned_only, strip_pinned};
use crate::core::types::{RefreshInterval, TimeRange};

/// Local filters first, then control-group filters. Consumers render pills in
/// this order.
pub fn combine_filters(local: Option<&[Filter]>, control: Option<&[Filter]>) -> Vec<Filter> {
    let local = local.unwrap_or_default();
    let control = control.unwrap_or_default();
    let mut combined = Vec::with_capacity(local.len() + control.len());
    combined.extend_from_slice(local);
    combined.extend_from_slice(control);
    combined
}

/// Filters after a reset: the current pinned filters survive, followed by the
/// saved filters.
pub fn reset_filters(current: Option<&[Filter]>, saved: Option<&[Filter]>) -> Vec<Filter> {
    let mut next = pinned_only(current.unwrap_or_default());
    next.extend_from_slice(saved.unwrap_or_default());
    next
}

/// Filters as they are persisted (pinned entries are session-local).
pub fn serializable_filters(local: Option<&[Filter]>) -> Option<Vec<Filter>> {
    local.map(strip_pinned)
}

/// Where a resolved time value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    UrlOverride,
    Restored,
    Service,
}

/// Resolve a time-like value by precedence: explicit URL override, then
/// `restored` when time restore is on, then the service's current value.
pub fn resolve<T>(
    url_override: Option<T>,
    time_restore: bool,
    restored: Option<T>,
    service: impl FnOnce() -> T,
) -> (T, Resolution) {
    if let Some(value) = url_override {
        return (value, Resolution::UrlOverride);
    }
    if time_restore && let Some(value) = restored {
        return (value, Resolution::Restored);
    }
    (service(), Resolution::Service)
}

pub fn resolve_time_range(
    url_override: Option<TimeRange>,
    time_restore: bool,
    restored: Option<TimeRange>,
    service: impl FnOnce() -> TimeRange,
) -> (TimeRange, Resolution) {
    resolve(url_override, time_restore, restored, service)
}

pub fn resolve_refresh_interval(
    url_override: Option<RefreshInterval>,
    time_restore: bool,
    restored: Option<RefreshInterval>,
    service: impl FnOnce() -> RefreshInterval,
) -> (RefreshInterval, Resolution) {
    resolve(url_override, time_restore, restored, service)
}
