//! In-process collaborator implementations.
//!
//! They honor the same contracts as the real services: change notifications
//! fire only on actual changes, and an auto-refresh tick is acknowledged only
//! once every subscriber completed its handle.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::core::filters::{Filter, pinned_only, strip_pinned};
use crate::core::types::{EsqlVariable, Query, RefreshInterval, TimeRange, TimeSlice};
use crate::io::config::SearchSyncConfig;
use crate::reactive::StateCell;
use crate::services::{
    AutoRefreshDone, ControlGroupApi, QueryService, TimeFilterService, UrlStateStorage,
};

const NOTIFY_CAPACITY: usize = 32;

#[derive(Debug)]
struct TimeFilterState {
    time: TimeRange,
    refresh_interval: RefreshInterval,
}

/// Time filter holding its state in memory.
#[derive(Debug)]
pub struct MemoryTimeFilter {
    state: Mutex<TimeFilterState>,
    time_defaults: TimeRange,
    refresh_defaults: RefreshInterval,
    time_tx: broadcast::Sender<()>,
    refresh_tx: broadcast::Sender<()>,
    auto_refresh: Mutex<Vec<mpsc::UnboundedSender<AutoRefreshDone>>>,
}

/// How an auto-refresh tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every subscriber completed its handle.
    Completed,
    /// At least one subscriber dropped its handle.
    Abandoned,
}

/// Pending acknowledgements for one auto-refresh tick.
#[derive(Debug)]
pub struct AutoRefreshCycle {
    pending: Vec<oneshot::Receiver<()>>,
}

impl AutoRefreshCycle {
    pub fn subscribers(&self) -> usize {
        self.pending.len()
    }

    pub async fn wait(self) -> CycleOutcome {
        let mut outcome = CycleOutcome::Completed;
        for rx in self.pending {
            if rx.await.is_err() {
                outcome = CycleOutcome::Abandoned;
            }
        }
        outcome
    }
}

impl MemoryTimeFilter {
    pub fn new(time_defaults: TimeRange, refresh_defaults: RefreshInterval) -> Self {
        let (time_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        let (refresh_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            state: Mutex::new(TimeFilterState {
                time: time_defaults.clone(),
                refresh_interval: refresh_defaults,
            }),
            time_defaults,
            refresh_defaults,
            time_tx,
            refresh_tx,
            auto_refresh: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(cfg: &SearchSyncConfig) -> Self {
        Self::new(cfg.default_time_range(), cfg.default_refresh_interval())
    }

    /// Hand a completion handle to every live subscriber.
    pub fn fire_auto_refresh(&self) -> AutoRefreshCycle {
        let mut subscribers = self
            .auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut pending = Vec::with_capacity(subscribers.len());
        subscribers.retain(|tx| {
            let (done, rx) = AutoRefreshDone::new();
            if tx.send(done).is_ok() {
                pending.push(rx);
                true
            } else {
                false
            }
        });
        debug!(subscribers = pending.len(), "auto refresh fired");
        AutoRefreshCycle { pending }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimeFilterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeFilterService for MemoryTimeFilter {
    fn time(&self) -> TimeRange {
        self.lock().time.clone()
    }

    fn set_time(&self, time: TimeRange) {
        let changed = {
            let mut state = self.lock();
            if state.time == time {
                false
            } else {
                state.time = time;
                true
            }
        };
        if changed {
            let _ = self.time_tx.send(());
        }
    }

    fn time_defaults(&self) -> TimeRange {
        self.time_defaults.clone()
    }

    fn refresh_interval(&self) -> RefreshInterval {
        self.lock().refresh_interval
    }

    fn set_refresh_interval(&self, interval: RefreshInterval) {
        let changed = {
            let mut state = self.lock();
            if state.refresh_interval == interval {
                false
            } else {
                state.refresh_interval = interval;
                true
            }
        };
        if changed {
            let _ = self.refresh_tx.send(());
        }
    }

    fn refresh_interval_defaults(&self) -> RefreshInterval {
        self.refresh_defaults
    }

    fn time_updates(&self) -> broadcast::Receiver<()> {
        self.time_tx.subscribe()
    }

    fn refresh_interval_updates(&self) -> broadcast::Receiver<()> {
        self.refresh_tx.subscribe()
    }

    fn auto_refresh_fetches(&self) -> mpsc::UnboundedReceiver<AutoRefreshDone> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

#[derive(Debug)]
struct QueryServiceState {
    query: Query,
    global_filters: Vec<Filter>,
    app_filters: Vec<Filter>,
}

/// Query service holding its state in memory.
#[derive(Debug)]
pub struct MemoryQueryService {
    default_query: Query,
    state: Mutex<QueryServiceState>,
    updates_tx: broadcast::Sender<()>,
}

impl MemoryQueryService {
    pub fn new(default_query: Query) -> Self {
        let (updates_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            state: Mutex::new(QueryServiceState {
                query: default_query.clone(),
                global_filters: Vec::new(),
                app_filters: Vec::new(),
            }),
            default_query,
            updates_tx,
        }
    }

    pub fn from_config(cfg: &SearchSyncConfig) -> Self {
        Self::new(cfg.default_query())
    }

    pub fn global_filters(&self) -> Vec<Filter> {
        self.lock().global_filters.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueryServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut QueryServiceState) -> bool) {
        let changed = apply(&mut self.lock());
        if changed {
            let _ = self.updates_tx.send(());
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl QueryService for MemoryQueryService {
    fn default_query(&self) -> Query {
        self.default_query.clone()
    }

    fn query(&self) -> Query {
        self.lock().query.clone()
    }

    fn set_query(&self, query: Query) {
        self.update(|state| replace_if_changed(&mut state.query, query));
    }

    fn filters(&self) -> Vec<Filter> {
        let state = self.lock();
        let mut all = state.global_filters.clone();
        all.extend(state.app_filters.iter().cloned());
        all
    }

    fn app_filters(&self) -> Vec<Filter> {
        self.lock().app_filters.clone()
    }

    fn set_filters(&self, filters: Vec<Filter>) {
        let global = pinned_only(&filters);
        let app = strip_pinned(&filters);
        self.update(|state| {
            let global_changed = replace_if_changed(&mut state.global_filters, global);
            let app_changed = replace_if_changed(&mut state.app_filters, app);
            global_changed || app_changed
        });
    }

    fn set_app_filters(&self, filters: Vec<Filter>) {
        let app = strip_pinned(&filters);
        self.update(|state| replace_if_changed(&mut state.app_filters, app));
    }

    fn updates(&self) -> broadcast::Receiver<()> {
        self.updates_tx.subscribe()
    }
}

/// URL state kept in a map. [`MemoryUrlStorage::navigate`] simulates an
/// external URL change.
#[derive(Debug)]
pub struct MemoryUrlStorage {
    entries: Mutex<BTreeMap<String, Value>>,
    changes_tx: broadcast::Sender<String>,
}

impl Default for MemoryUrlStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUrlStorage {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            changes_tx,
        }
    }

    /// Replace `key` as if the user edited the URL.
    pub fn navigate(&self, key: &str, value: Value) {
        self.set(key, value);
        let _ = self.changes_tx.send(key.to_string());
    }
}

impl UrlStateStorage for MemoryUrlStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes_tx.subscribe()
    }
}

/// Control group whose outputs are set directly.
#[derive(Debug, Clone)]
pub struct MemoryControlGroup {
    filters: StateCell<Option<Vec<Filter>>>,
    time_slice: StateCell<Option<TimeSlice>>,
    esql_variables: StateCell<Vec<EsqlVariable>>,
}

impl Default for MemoryControlGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryControlGroup {
    pub fn new() -> Self {
        Self {
            filters: StateCell::new(None),
            time_slice: StateCell::new(None),
            esql_variables: StateCell::new(Vec::new()),
        }
    }

    pub fn set_filters(&self, filters: Option<Vec<Filter>>) {
        self.filters.replace(filters);
    }

    pub fn set_time_slice(&self, time_slice: Option<TimeSlice>) {
        self.time_slice.replace(time_slice);
    }

    pub fn set_esql_variables(&self, variables: Vec<EsqlVariable>) {
        self.esql_variables.replace(variables);
    }
}

impl ControlGroupApi for MemoryControlGroup {
    fn filters(&self) -> watch::Receiver<Option<Vec<Filter>>> {
        self.filters.subscribe()
    }

    fn time_slice(&self) -> watch::Receiver<Option<TimeSlice>> {
        self.time_slice.subscribe()
    }

    fn esql_variables(&self) -> watch::Receiver<Vec<EsqlVariable>> {
        self.esql_variables.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_filter() -> MemoryTimeFilter {
        MemoryTimeFilter::from_config(&SearchSyncConfig::default())
    }

    #[test]
    fn time_filter_notifies_only_on_change() {
        let tf = time_filter();
        let mut updates = tf.time_updates();

        tf.set_time(tf.time_defaults());
        assert!(updates.try_recv().is_err());

        tf.set_time(TimeRange::new("now-1h", "now"));
        assert!(updates.try_recv().is_ok());
        assert_eq!(tf.time(), TimeRange::new("now-1h", "now"));
    }

    #[tokio::test]
    async fn auto_refresh_waits_for_every_subscriber() {
        let tf = time_filter();
        let mut first = tf.auto_refresh_fetches();
        let mut second = tf.auto_refresh_fetches();

        let cycle = tf.fire_auto_refresh();
        assert_eq!(cycle.subscribers(), 2);
        first.recv().await.expect("handle").complete();
        second.recv().await.expect("handle").complete();
        assert_eq!(cycle.wait().await, CycleOutcome::Completed);

        let cycle = tf.fire_auto_refresh();
        first.recv().await.expect("handle").complete();
        drop(second.recv().await.expect("handle"));
        assert_eq!(cycle.wait().await, CycleOutcome::Abandoned);
    }

    #[test]
    fn auto_refresh_forgets_closed_subscribers() {
        let tf = time_filter();
        drop(tf.auto_refresh_fetches());
        assert_eq!(tf.fire_auto_refresh().subscribers(), 0);
    }

    #[test]
    fn query_service_routes_pinned_filters_to_global_store() {
        let qs = MemoryQueryService::from_config(&SearchSyncConfig::default());
        let mut updates = qs.updates();
        let app = Filter::default();
        let pinned = Filter::default().pin();

        qs.set_filters(vec![app.clone(), pinned.clone()]);
        assert!(updates.try_recv().is_ok());
        assert_eq!(qs.app_filters(), vec![app.clone()]);
        assert_eq!(qs.global_filters(), vec![pinned.clone()]);
        assert_eq!(qs.filters(), vec![pinned, app.clone()]);

        qs.set_app_filters(vec![app]);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn url_set_is_silent_but_navigate_notifies() {
        let storage = MemoryUrlStorage::new();
        let mut changes = storage.changes();
        storage.set("_g", Value::Null);
        assert!(changes.try_recv().is_err());
        storage.navigate("_g", Value::Bool(true));
        assert_eq!(changes.try_recv().expect("change"), "_g");
        assert_eq!(storage.get("_g"), Some(Value::Bool(true)));
    }
}
