//! Unsaved-change detection.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tracing::trace;

use crate::core::compare::{StateDiff, diff_state};
use crate::core::types::{ComparableState, SearchState};
use crate::reactive::{Debouncer, change_stream, merge_changes};

use super::{SearchCells, Shared};

enum Step {
    Sampled,
    SavedChanged,
    Idle,
    Done,
}

fn sample(cells: &SearchCells) -> ComparableState {
    ComparableState {
        filters: cells.local_filters.get(),
        query: cells.query.get(),
        refresh_interval: cells.refresh_interval.get(),
        time_range: cells.time_range.get(),
    }
}

/// Diffs of the live state against `last_saved`.
///
/// Nothing is emitted until the live state has been sampled once, after the
/// first quiet period.
pub(super) fn diff_stream(
    shared: Arc<Shared>,
    mut last_saved: watch::Receiver<SearchState>,
) -> BoxStream<'static, StateDiff> {
    let cells = &shared.cells;
    let changes = merge_changes([
        change_stream(cells.local_filters.subscribe()),
        change_stream(cells.query.subscribe()),
        change_stream(cells.refresh_interval.subscribe()),
        change_stream(cells.time_range.subscribe()),
    ]);
    let quiet = shared.comparison_debounce;

    async_stream::stream! {
        let mut changes = changes;
        let mut debouncer = Debouncer::armed(quiet);
        let mut latest: Option<ComparableState> = None;
        let mut saved_open = true;
        loop {
            let step = tokio::select! {
                () = debouncer.fired() => Step::Sampled,
                next = changes.next() => match next {
                    Some(()) => {
                        debouncer.poke();
                        Step::Idle
                    }
                    None => Step::Done,
                },
                changed = last_saved.changed(), if saved_open => match changed {
                    Ok(()) => Step::SavedChanged,
                    Err(_) => {
                        saved_open = false;
                        Step::Idle
                    }
                },
            };
            match step {
                Step::Sampled => latest = Some(sample(&shared.cells)),
                Step::SavedChanged if latest.is_some() => {}
                Step::SavedChanged | Step::Idle => continue,
                Step::Done => break,
            }
            if let Some(state) = &latest {
                let saved = last_saved.borrow_and_update().clone();
                let diff = diff_state(&saved, state, shared.time_restore());
                trace!(changed = ?diff.changed_fields(), "compared with last saved state");
                yield diff;
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::{Filter, FilterMeta};
    use crate::core::types::{Query, TimeRange};
    use crate::io::config::SearchSyncConfig;
    use crate::manager::{CreationOptions, ManagerInputs, SearchManager};
    use crate::reactive::Pulse;
    use crate::services::SearchServices;
    use crate::services::memory::{MemoryQueryService, MemoryTimeFilter};
    use std::time::Duration;
    use tokio::time::Instant;

    fn saved(time_restore: bool) -> SearchState {
        SearchState {
            filters: Some(Vec::new()),
            query: Some(Query::new("", "kuery")),
            refresh_interval: None,
            time_range: Some(TimeRange::new("now-15m", "now")),
            time_restore: Some(time_restore),
        }
    }

    fn manager(initial: SearchState, time_restore: bool) -> SearchManager {
        let cfg = SearchSyncConfig::default();
        let (_cg_tx, control_group) = watch::channel(None);
        let (_tr_tx, time_restore) = watch::channel(Some(time_restore));
        let inputs = ManagerInputs {
            initial_state: initial,
            control_group,
            time_restore,
            panels_loaded: Pulse::new(),
            last_saved_state: Arc::new(|| None::<SearchState>),
            services: SearchServices {
                time_filter: Arc::new(MemoryTimeFilter::from_config(&cfg)),
                query: Arc::new(MemoryQueryService::from_config(&cfg)),
            },
            options: Some(CreationOptions::default()),
        };
        SearchManager::initialize(inputs, &cfg)
    }

    #[tokio::test(start_paused = true)]
    async fn first_diff_arrives_after_quiet_period() {
        let manager = manager(saved(false), false);
        let (_tx, rx) = watch::channel(saved(false));
        let start = Instant::now();
        let mut diffs = manager.internal_api().start_comparing(rx);

        let diff = diffs.next().await.expect("diff");
        assert!(!diff.is_dirty());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_is_compared_once() {
        let manager = manager(saved(false), false);
        let (_tx, rx) = watch::channel(saved(false));
        let mut diffs = manager.internal_api().start_comparing(rx);
        assert!(!diffs.next().await.expect("initial").is_dirty());

        let api = manager.api();
        api.set_query(Query::new("a", "kuery"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        api.set_query(Query::new("ab", "kuery"));

        let diff = diffs.next().await.expect("diff");
        assert_eq!(diff.changed_fields(), vec!["query"]);
    }

    #[tokio::test(start_paused = true)]
    async fn time_range_counts_only_with_time_restore() {
        for (time_restore, dirty) in [(false, false), (true, true)] {
            let manager = manager(saved(time_restore), time_restore);
            let (_tx, rx) = watch::channel(saved(time_restore));
            let mut diffs = manager.internal_api().start_comparing(rx);
            assert!(!diffs.next().await.expect("initial").is_dirty());

            manager
                .api()
                .set_time_range(Some(TimeRange::new("now-7d", "now")));
            let diff = diffs.next().await.expect("diff");
            assert_eq!(diff.time_range, dirty, "time_restore={time_restore}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saved_state_change_is_compared_immediately() {
        let manager = manager(saved(false), false);
        let (tx, rx) = watch::channel(saved(false));
        let mut diffs = manager.internal_api().start_comparing(rx);
        assert!(!diffs.next().await.expect("initial").is_dirty());

        let pinned_only_change = SearchState {
            filters: Some(vec![
                Filter {
                    meta: FilterMeta {
                        key: Some("env".to_string()),
                        ..FilterMeta::default()
                    },
                    ..Filter::default()
                }
                .pin(),
            ]),
            ..saved(false)
        };
        let before = Instant::now();
        tx.send_replace(pinned_only_change);
        let diff = diffs.next().await.expect("diff");
        assert!(!diff.is_dirty());
        assert!(before.elapsed() < Duration::from_millis(100));
    }
}
