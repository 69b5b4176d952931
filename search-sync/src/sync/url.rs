//! Mirror of global query state (time, refresh interval, pinned filters)
//! between the services and the URL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::filters::{Filter, compare_filters, pinned_only, strip_pinned};
use crate::core::types::{GlobalQueryState, RefreshInterval, TimeRange};
use crate::reactive::Subscription;
use crate::services::{SearchServices, UrlStateStorage, global_query_state};

/// Running URL sync. Both directions write only on difference, so a pull
/// followed by the resulting service notification never writes back.
pub struct GlobalUrlSync {
    services: SearchServices,
    storage: Arc<dyn UrlStateStorage>,
    key: String,
    stopped: AtomicBool,
    task: Mutex<Option<Subscription>>,
    overrides: Mutex<UrlOverrides>,
}

/// Values the URL applied to the services, as opposed to values mirrored
/// into the URL from them.
#[derive(Debug, Default)]
struct UrlOverrides {
    time: Option<TimeRange>,
    refresh_interval: Option<RefreshInterval>,
}

impl GlobalUrlSync {
    /// Apply URL state to the services, write the merged result back, and keep
    /// both in sync until [`GlobalUrlSync::stop`].
    pub fn start(
        services: SearchServices,
        storage: Arc<dyn UrlStateStorage>,
        key: impl Into<String>,
    ) -> Arc<Self> {
        let sync = Arc::new(Self {
            services,
            storage,
            key: key.into(),
            stopped: AtomicBool::new(false),
            task: Mutex::new(None),
            overrides: Mutex::new(UrlOverrides::default()),
        });
        sync.pull_from_url();
        sync.push_to_url();

        let mut url_changes = sync.storage.changes();
        let mut time_updates = sync.services.time_filter.time_updates();
        let mut refresh_updates = sync.services.time_filter.refresh_interval_updates();
        let mut query_updates = sync.services.query.updates();
        let worker = Arc::clone(&sync);
        let task = Subscription::spawn(async move {
            loop {
                tokio::select! {
                    changed = url_changes.recv() => match changed {
                        Ok(key) if key == worker.key => worker.pull_from_url(),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => worker.pull_from_url(),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    update = time_updates.recv() => {
                        if is_closed(&update) { break; }
                        worker.push_to_url();
                    }
                    update = refresh_updates.recv() => {
                        if is_closed(&update) { break; }
                        worker.push_to_url();
                    }
                    update = query_updates.recv() => {
                        if is_closed(&update) { break; }
                        worker.push_to_url();
                    }
                }
            }
        });
        *sync.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        debug!(key = %sync.key, "global url sync started");
        sync
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Time taken from the URL, as long as the time filter still holds it.
    ///
    /// Once the time filter moves elsewhere the override is dropped for good.
    pub fn time_override(&self) -> Option<TimeRange> {
        let current = self.services.time_filter.time();
        let mut overrides = self.lock_overrides();
        if overrides.time.as_ref() != Some(&current) {
            overrides.time = None;
        }
        overrides.time.clone()
    }

    /// Refresh interval taken from the URL, as long as the time filter still
    /// holds it.
    pub fn refresh_interval_override(&self) -> Option<RefreshInterval> {
        let current = self.services.time_filter.refresh_interval();
        let mut overrides = self.lock_overrides();
        if overrides.refresh_interval != Some(current) {
            overrides.refresh_interval = None;
        }
        overrides.refresh_interval
    }

    fn lock_overrides(&self) -> std::sync::MutexGuard<'_, UrlOverrides> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the services' global state to the URL if it differs.
    pub fn push_to_url(&self) {
        if self.is_stopped() {
            return;
        }
        let next = GlobalQueryState {
            time: Some(self.services.time_filter.time()),
            refresh_interval: Some(self.services.time_filter.refresh_interval()),
            filters: Some(pinned_only(&self.services.query.filters())),
        };
        let current = global_query_state(self.storage.as_ref(), &self.key).unwrap_or_default();
        if same_global_state(&current, &next) {
            return;
        }
        let mut merged = match self.storage.get(&self.key) {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        match serde_json::to_value(&next) {
            Ok(Value::Object(fields)) => merged.extend(fields),
            Ok(_) => return,
            Err(err) => {
                warn!(error = %err, "failed to encode global url state");
                return;
            }
        }
        debug!(key = %self.key, "writing global state to url");
        self.storage.set(&self.key, Value::Object(merged));
    }

    /// Apply the URL's global state to the services where it differs.
    pub fn pull_from_url(&self) {
        if self.is_stopped() {
            return;
        }
        let Some(state) = global_query_state(self.storage.as_ref(), &self.key) else {
            return;
        };
        {
            let mut overrides = self.lock_overrides();
            overrides.time = state.time.clone();
            overrides.refresh_interval = state.refresh_interval;
        }
        let time_filter = &self.services.time_filter;
        if let Some(time) = state.time
            && time != time_filter.time()
        {
            debug!(from = %time.from, to = %time.to, "applying url time to time filter");
            time_filter.set_time(time);
        }
        if let Some(interval) = state.refresh_interval
            && interval != time_filter.refresh_interval()
        {
            time_filter.set_refresh_interval(interval);
        }
        if let Some(filters) = state.filters {
            let query = &self.services.query;
            let current = query.filters();
            let url_pinned: Vec<Filter> = filters.into_iter().map(Filter::pin).collect();
            if !compare_filters(&url_pinned, &pinned_only(&current)) {
                let mut next = url_pinned;
                next.extend(strip_pinned(&current));
                query.set_filters(next);
            }
        }
    }

    /// Stop syncing. Later calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(task);
        debug!(key = %self.key, "global url sync stopped");
    }
}

fn is_closed(update: &Result<(), broadcast::error::RecvError>) -> bool {
    matches!(update, Err(broadcast::error::RecvError::Closed))
}

fn same_global_state(a: &GlobalQueryState, b: &GlobalQueryState) -> bool {
    let filters_equal = compare_filters(
        a.filters.as_deref().unwrap_or_default(),
        b.filters.as_deref().unwrap_or_default(),
    );
    a.time == b.time && a.refresh_interval == b.refresh_interval && filters_equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::FilterMeta;
    use crate::core::types::{RefreshInterval, TimeRange};
    use crate::io::config::SearchSyncConfig;
    use crate::services::memory::{MemoryQueryService, MemoryTimeFilter, MemoryUrlStorage};
    use crate::services::{QueryService, TimeFilterService};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        time_filter: Arc<MemoryTimeFilter>,
        query: Arc<MemoryQueryService>,
        storage: Arc<MemoryUrlStorage>,
    }

    impl Fixture {
        fn new() -> Self {
            let cfg = SearchSyncConfig::default();
            Self {
                time_filter: Arc::new(MemoryTimeFilter::from_config(&cfg)),
                query: Arc::new(MemoryQueryService::from_config(&cfg)),
                storage: Arc::new(MemoryUrlStorage::new()),
            }
        }

        fn start(&self) -> Arc<GlobalUrlSync> {
            let services = SearchServices {
                time_filter: self.time_filter.clone(),
                query: self.query.clone(),
            };
            GlobalUrlSync::start(services, self.storage.clone(), "_g")
        }

        fn url_state(&self) -> GlobalQueryState {
            global_query_state(self.storage.as_ref(), "_g").expect("url state")
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_applies_url_then_writes_back() {
        let fx = Fixture::new();
        fx.storage.set(
            "_g",
            json!({ "time": { "from": "now-1h", "to": "now" }, "viewMode": "edit" }),
        );
        let _sync = fx.start();

        assert_eq!(fx.time_filter.time(), TimeRange::new("now-1h", "now"));
        let raw = fx.storage.get("_g").expect("written");
        assert_eq!(raw["viewMode"], "edit");
        assert_eq!(
            fx.url_state().refresh_interval,
            Some(fx.time_filter.refresh_interval())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn service_changes_are_mirrored_into_url() {
        let fx = Fixture::new();
        let _sync = fx.start();

        fx.time_filter.set_time(TimeRange::new("now-7d", "now"));
        fx.time_filter.set_refresh_interval(RefreshInterval {
            pause: false,
            value: 10_000,
        });
        let pinned = Filter {
            meta: FilterMeta {
                key: Some("env".to_string()),
                ..FilterMeta::default()
            },
            ..Filter::default()
        }
        .pin();
        fx.query.set_filters(vec![pinned.clone(), Filter::default()]);
        settle().await;

        let url = fx.url_state();
        assert_eq!(url.time, Some(TimeRange::new("now-7d", "now")));
        assert_eq!(url.refresh_interval.map(|r| r.value), Some(10_000));
        assert_eq!(url.filters, Some(vec![pinned]));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_updates_services() {
        let fx = Fixture::new();
        let _sync = fx.start();

        fx.storage.navigate(
            "_g",
            json!({ "time": { "from": "now-30d", "to": "now" },
                    "filters": [{ "meta": { "key": "env" } }] }),
        );
        settle().await;

        assert_eq!(fx.time_filter.time(), TimeRange::new("now-30d", "now"));
        let global = fx.query.global_filters();
        assert_eq!(global.len(), 1);
        assert!(global[0].is_pinned());
    }

    #[tokio::test(start_paused = true)]
    async fn url_override_lasts_until_time_filter_moves() {
        let fx = Fixture::new();
        let sync = fx.start();
        assert_eq!(sync.time_override(), None);

        fx.storage.navigate(
            "_g",
            json!({ "time": { "from": "now-30d", "to": "now" },
                    "refreshInterval": { "pause": false, "value": 5000 } }),
        );
        settle().await;
        assert_eq!(sync.time_override(), Some(TimeRange::new("now-30d", "now")));
        assert_eq!(sync.refresh_interval_override().map(|r| r.value), Some(5_000));

        // Mirroring a picker change into the URL does not make it an override.
        fx.time_filter.set_time(TimeRange::new("now-2h", "now"));
        settle().await;
        assert_eq!(fx.url_state().time, Some(TimeRange::new("now-2h", "now")));
        assert_eq!(sync.time_override(), None);
        assert_eq!(sync.refresh_interval_override().map(|r| r.value), Some(5_000));

        fx.time_filter.set_time(TimeRange::new("now-30d", "now"));
        assert_eq!(sync.time_override(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_freezes_url() {
        let fx = Fixture::new();
        let sync = fx.start();
        sync.stop();
        sync.stop();
        assert!(sync.is_stopped());

        fx.time_filter.set_time(TimeRange::new("now-2d", "now"));
        settle().await;
        assert_eq!(fx.url_state().time, Some(TimeRange::new("now-15m", "now")));
    }
}
