//! Wiring the manager to the shared services and the URL.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::filters::{clean_filters_for_serialize, with_missing_pinned};
use crate::core::state_update::{Resolution, resolve_refresh_interval, resolve_time_range};
use crate::core::types::QueryState;
use crate::io::config::SearchSyncConfig;
use crate::reactive::{
    Debouncer, Pulse, Subscription, change_stream, merge_changes, next_pulse,
};
use crate::services::{AutoRefreshDone, QueryService, UrlStateStorage, global_query_state};
use crate::sync::{GlobalUrlSync, QueryStateBinding, SyncTargets, connect_to_query_state};

use super::{LastSavedState, SearchCells, Shared};

pub(super) struct Active {
    /// Time, refresh-interval, and auto-refresh reactions.
    pub reactions: Vec<Subscription>,
    pub url_sync: Arc<GlobalUrlSync>,
    pub binding: Subscription,
}

/// Hand local state to the services, resolve the initial time range, and
/// start every integration reaction.
pub(super) fn activate(
    shared: &Arc<Shared>,
    storage: Arc<dyn UrlStateStorage>,
    panels_loaded: Pulse,
    last_saved_state: LastSavedState,
    cfg: &SearchSyncConfig,
) -> Active {
    let cells = &shared.cells;
    let services = &shared.services;
    let key = cfg.global_state_key.clone();

    let filters = cells.local_filters.with(|filters| {
        with_missing_pinned(filters.as_deref().unwrap_or_default(), &services.query.filters())
    });
    services.query.set_filters(filters);
    services.query.set_query(
        cells
            .query
            .get()
            .unwrap_or_else(|| services.query.default_query()),
    );

    let time_restore = shared.time_restore();
    let url_time = global_query_state(storage.as_ref(), &key).and_then(|state| state.time);
    let (initial_time, resolution) =
        resolve_time_range(url_time, time_restore, cells.time_range.get(), || {
            services.time_filter.time()
        });
    info!(
        from = %initial_time.from,
        to = %initial_time.to,
        source = ?resolution,
        "resolved initial time range"
    );
    cells.time_range.set(Some(initial_time));
    if time_restore {
        if let Some(time) = cells.time_range.get() {
            services.time_filter.set_time(time);
        }
        if let Some(interval) = cells.refresh_interval.get() {
            services.time_filter.set_refresh_interval(interval);
        }
    }

    let url_sync = GlobalUrlSync::start(services.clone(), storage, key);

    let binding = connect_to_query_state(
        Arc::clone(&services.query),
        local_binding(cells, Arc::clone(&services.query), cfg),
        SyncTargets::ALL,
    );

    let reactions = vec![
        follow_time_updates(shared, Arc::clone(&url_sync), Arc::clone(&last_saved_state)),
        follow_refresh_interval_updates(shared, Arc::clone(&url_sync), last_saved_state),
        run_auto_refresh(shared, panels_loaded),
    ];

    info!("unified search integration active");
    Active {
        reactions,
        url_sync,
        binding,
    }
}

/// Local query and filters as seen by the query service binding.
///
/// Query and filter changes made in the same tick reach the binding as one
/// value.
fn local_binding(
    cells: &SearchCells,
    query_service: Arc<dyn QueryService>,
    cfg: &SearchSyncConfig,
) -> QueryStateBinding {
    let snapshot = {
        let cells = cells.clone();
        let query_service = Arc::clone(&query_service);
        move || QueryState {
            query: cells
                .query
                .get()
                .unwrap_or_else(|| query_service.default_query()),
            filters: cells.local_filters.get().unwrap_or_default(),
        }
    };

    let setter = cells.clone();
    let set = move |next: QueryState| {
        setter
            .local_filters
            .set(Some(clean_filters_for_serialize(next.filters)));
        setter.query.set(Some(next.query));
    };

    let changes = merge_changes([
        change_stream(cells.query.subscribe()),
        change_stream(cells.local_filters.subscribe()),
    ]);
    let quiet = cfg.url_sync_debounce();
    let stream_snapshot = snapshot.clone();
    let state: BoxStream<'static, QueryState> = async_stream::stream! {
        let mut changes = changes;
        let mut debouncer = Debouncer::new(quiet);
        let mut last: Option<QueryState> = None;
        loop {
            let fired = tokio::select! {
                biased;
                () = debouncer.fired() => true,
                next = changes.next() => {
                    if next.is_none() {
                        break;
                    }
                    debouncer.poke();
                    false
                }
            };
            if fired {
                let state = stream_snapshot();
                if last.as_ref() != Some(&state) {
                    last = Some(state.clone());
                    yield state;
                }
            }
        }
    }
    .boxed();

    QueryStateBinding {
        get: Box::new(snapshot),
        set: Box::new(set),
        state,
    }
}

/// Re-resolve the local time range whenever the time filter changes.
///
/// Resolution only writes locally so the time filter never sees its own
/// update echoed back.
fn follow_time_updates(
    shared: &Arc<Shared>,
    url_sync: Arc<GlobalUrlSync>,
    last_saved_state: LastSavedState,
) -> Subscription {
    let shared = Arc::clone(shared);
    let mut updates = shared.services.time_filter.time_updates();
    Subscription::spawn(async move {
        while next_update(&mut updates).await {
            let restored = last_saved_state().and_then(|saved| saved.time_range);
            let (time, resolution) = resolve_time_range(
                url_sync.time_override(),
                shared.time_restore(),
                restored,
                || shared.services.time_filter.time(),
            );
            log_resolution("time range", resolution);
            shared.cells.time_range.set(Some(time));
        }
    })
}

fn follow_refresh_interval_updates(
    shared: &Arc<Shared>,
    url_sync: Arc<GlobalUrlSync>,
    last_saved_state: LastSavedState,
) -> Subscription {
    let shared = Arc::clone(shared);
    let mut updates = shared.services.time_filter.refresh_interval_updates();
    Subscription::spawn(async move {
        while next_update(&mut updates).await {
            let restored = last_saved_state().and_then(|saved| saved.refresh_interval);
            let (interval, resolution) = resolve_refresh_interval(
                url_sync.refresh_interval_override(),
                shared.time_restore(),
                restored,
                || shared.services.time_filter.refresh_interval(),
            );
            log_resolution("refresh interval", resolution);
            shared.cells.refresh_interval.set(Some(interval));
        }
    })
}

async fn next_update(updates: &mut broadcast::Receiver<()>) -> bool {
    match updates.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => true,
        Err(broadcast::error::RecvError::Closed) => false,
    }
}

fn log_resolution(field: &'static str, resolution: Resolution) {
    debug!(field, source = ?resolution, "re-resolved after time filter update");
}

/// Answer auto-refresh ticks: reload the control group and panels, then
/// acknowledge the tick once the panels report loaded.
///
/// A tick arriving while the previous one is still waiting supersedes it; the
/// superseded tick is acknowledged right away. Teardown drops a pending tick
/// unacknowledged.
fn run_auto_refresh(shared: &Arc<Shared>, panels_loaded: Pulse) -> Subscription {
    let shared = Arc::clone(shared);
    let mut fetches = shared.services.time_filter.auto_refresh_fetches();
    Subscription::spawn(async move {
        let mut loaded = panels_loaded.subscribe();
        let mut pending: Option<AutoRefreshDone> = None;
        loop {
            tokio::select! {
                fetch = fetches.recv() => {
                    let Some(done) = fetch else {
                        break;
                    };
                    if let Some(previous) = pending.take() {
                        debug!("auto-refresh superseded before panels loaded");
                        previous.complete();
                    }
                    // Only completions after this tick's reload count.
                    loaded = panels_loaded.subscribe();
                    debug!("auto-refresh fired");
                    shared.force_refresh();
                    pending = Some(done);
                }
                _ = next_pulse(&mut loaded), if pending.is_some() => {
                    if let Some(done) = pending.take() {
                        debug!("panels loaded, auto-refresh complete");
                        done.complete();
                    }
                }
            }
        }
    })
}
