//! Search-state synchronizer for one dashboard.
//!
//! [`SearchManager`] owns the query, filters, time range, refresh interval,
//! time slice, and ES|QL variables of a dashboard. It folds in what the
//! control group contributes and, when integration is enabled, keeps the
//! state in sync with the shared services and the URL.
//!
//! Consumers get two handles:
//! - [`SearchApi`]: read-only receivers plus setters, for panels and the UI.
//! - [`InternalSearchApi`]: reload requests, unsaved-change detection, reset,
//!   and serialization, for the owning dashboard.
//!
//! Every background reaction is a [`Subscription`]; [`SearchManager::cleanup`]
//! (or dropping the manager) tears all of them down.

mod comparison;
mod control_group;
mod integration;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::core::compare::StateDiff;
use crate::core::filters::Filter;
use crate::core::state_update::{combine_filters, reset_filters, serializable_filters};
use crate::core::types::{
    DEFAULT_TIME_RESTORE, EsqlVariable, Query, RefreshInterval, SearchState, TimeRange, TimeSlice,
};
use crate::io::config::SearchSyncConfig;
use crate::reactive::{Pulse, StateCell, Subscription, Subscriptions};
use crate::services::{ControlGroupApi, SearchServices, UrlStateStorage};

/// Getter for the most recently persisted state.
pub type LastSavedState = Arc<dyn Fn() -> Option<SearchState> + Send + Sync>;

/// How the manager talks to the outside world.
#[derive(Clone, Default)]
pub struct CreationOptions {
    /// Mirror state into the shared services.
    pub use_unified_search_integration: bool,
    /// URL storage; integration only activates when this is present.
    pub url_storage: Option<Arc<dyn UrlStateStorage>>,
}

pub struct ManagerInputs {
    pub initial_state: SearchState,
    pub control_group: watch::Receiver<Option<Arc<dyn ControlGroupApi>>>,
    pub time_restore: watch::Receiver<Option<bool>>,
    /// Fires when every panel finished loading.
    pub panels_loaded: Pulse,
    pub last_saved_state: LastSavedState,
    pub services: SearchServices,
    pub options: Option<CreationOptions>,
}

/// State cells owned by one manager.
#[derive(Clone)]
pub(crate) struct SearchCells {
    pub query: StateCell<Option<Query>>,
    pub refresh_interval: StateCell<Option<RefreshInterval>>,
    pub time_range: StateCell<Option<TimeRange>>,
    /// Filters set through the search bar or by the dashboard.
    pub local_filters: StateCell<Option<Vec<Filter>>>,
    /// Local filters followed by control-group filters.
    pub filters: StateCell<Vec<Filter>>,
    pub time_slice: StateCell<Option<TimeSlice>>,
    pub esql_variables: StateCell<Vec<EsqlVariable>>,
}

impl SearchCells {
    fn new(initial: &SearchState) -> Self {
        Self {
            query: StateCell::new(initial.query.clone()),
            refresh_interval: StateCell::new(initial.refresh_interval),
            time_range: StateCell::new(initial.time_range.clone()),
            local_filters: StateCell::new(initial.filters.clone()),
            filters: StateCell::new(combine_filters(initial.filters.as_deref(), None)),
            time_slice: StateCell::new(None),
            esql_variables: StateCell::new(Vec::new()),
        }
    }
}

struct Shared {
    cells: SearchCells,
    services: SearchServices,
    time_restore: watch::Receiver<Option<bool>>,
    sync_with_services: bool,
    control_group_reload: Pulse,
    panels_reload: Pulse,
    comparison_debounce: Duration,
}

impl Shared {
    fn time_restore(&self) -> bool {
        self.time_restore.borrow().unwrap_or(DEFAULT_TIME_RESTORE)
    }

    fn set_and_sync_time_range(&self, time_range: Option<TimeRange>) {
        let time_filter = &self.services.time_filter;
        let next = time_range.unwrap_or_else(|| time_filter.time_defaults());
        self.cells.time_range.set(Some(next.clone()));
        if self.sync_with_services {
            time_filter.set_time(next);
        }
    }

    fn set_and_sync_refresh_interval(&self, interval: Option<RefreshInterval>) {
        let time_filter = &self.services.time_filter;
        let next = interval.unwrap_or_else(|| time_filter.refresh_interval_defaults());
        self.cells.refresh_interval.set(Some(next));
        if self.sync_with_services {
            time_filter.set_refresh_interval(next);
        }
    }

    fn force_refresh(&self) {
        self.control_group_reload.emit();
        self.panels_reload.emit();
    }
}

/// Handle for panels and the search bar. Cheap to clone.
#[derive(Clone)]
pub struct SearchApi {
    shared: Arc<Shared>,
}

impl SearchApi {
    /// Combined filters: local ones, then the control group's.
    pub fn filters(&self) -> watch::Receiver<Vec<Filter>> {
        self.shared.cells.filters.subscribe()
    }

    /// Filters set locally, without control-group contributions.
    pub fn local_filters(&self) -> watch::Receiver<Option<Vec<Filter>>> {
        self.shared.cells.local_filters.subscribe()
    }

    pub fn esql_variables(&self) -> watch::Receiver<Vec<EsqlVariable>> {
        self.shared.cells.esql_variables.subscribe()
    }

    pub fn query(&self) -> watch::Receiver<Option<Query>> {
        self.shared.cells.query.subscribe()
    }

    pub fn refresh_interval(&self) -> watch::Receiver<Option<RefreshInterval>> {
        self.shared.cells.refresh_interval.subscribe()
    }

    pub fn time_range(&self) -> watch::Receiver<Option<TimeRange>> {
        self.shared.cells.time_range.subscribe()
    }

    pub fn time_slice(&self) -> watch::Receiver<Option<TimeSlice>> {
        self.shared.cells.time_slice.subscribe()
    }

    pub fn set_filters(&self, filters: Vec<Filter>) {
        self.shared.cells.local_filters.set(Some(filters));
    }

    pub fn set_query(&self, query: Query) {
        self.shared.cells.query.set(Some(query));
    }

    /// Set the time range, falling back to the time filter's defaults, and
    /// push it to the time filter when integration is enabled.
    pub fn set_time_range(&self, time_range: Option<TimeRange>) {
        self.shared.set_and_sync_time_range(time_range);
    }

    /// Reload the control group and every panel.
    pub fn force_refresh(&self) {
        debug!("forced refresh");
        self.shared.force_refresh();
    }
}

/// Handle for the owning dashboard.
#[derive(Clone)]
pub struct InternalSearchApi {
    shared: Arc<Shared>,
}

impl InternalSearchApi {
    pub fn control_group_reload(&self) -> broadcast::Receiver<()> {
        self.shared.control_group_reload.subscribe()
    }

    pub fn panels_reload(&self) -> broadcast::Receiver<()> {
        self.shared.panels_reload.subscribe()
    }

    /// Unsaved-change detection against `last_saved`.
    ///
    /// Live state is sampled after a quiet period (see
    /// [`SearchSyncConfig::comparison_debounce_ms`]); a change of the saved
    /// state is compared right away.
    pub fn start_comparing(
        &self,
        last_saved: watch::Receiver<SearchState>,
    ) -> BoxStream<'static, StateDiff> {
        comparison::diff_stream(Arc::clone(&self.shared), last_saved)
    }

    /// Return to `saved`. Pinned filters survive.
    pub fn reset(&self, saved: &SearchState) {
        let cells = &self.shared.cells;
        let filters = cells
            .local_filters
            .with(|current| reset_filters(current.as_deref(), saved.filters.as_deref()));
        cells.local_filters.set(Some(filters));
        if let Some(query) = &saved.query {
            cells.query.set(Some(query.clone()));
        }
        if saved.time_restore == Some(true) {
            self.shared.set_and_sync_refresh_interval(saved.refresh_interval);
            self.shared.set_and_sync_time_range(saved.time_range.clone());
        }
        debug!(time_restore = ?saved.time_restore, "search state reset");
    }

    /// State as persisted. Pinned filters are left out.
    pub fn get_state(&self) -> SearchState {
        let cells = &self.shared.cells;
        SearchState {
            filters: cells
                .local_filters
                .with(|filters| serializable_filters(filters.as_deref())),
            query: cells.query.get(),
            refresh_interval: cells.refresh_interval.get(),
            time_range: cells.time_range.get(),
            time_restore: Some(self.shared.time_restore()),
        }
    }

    /// Local write only.
    pub fn set_refresh_interval(&self, interval: RefreshInterval) {
        self.shared.cells.refresh_interval.set(Some(interval));
    }

    pub fn set_and_sync_refresh_interval(&self, interval: Option<RefreshInterval>) {
        self.shared.set_and_sync_refresh_interval(interval);
    }

    pub fn set_and_sync_time_range(&self, time_range: Option<TimeRange>) {
        self.shared.set_and_sync_time_range(time_range);
    }
}

/// Running synchronizer.
pub struct SearchManager {
    api: SearchApi,
    internal: InternalSearchApi,
    control_group: Subscriptions,
    integration: Subscriptions,
    stop_syncing: Subscriptions,
    cleaned_up: AtomicBool,
}

impl SearchManager {
    /// Build the state cells and start every reaction. Must be called inside a
    /// tokio runtime.
    pub fn initialize(inputs: ManagerInputs, cfg: &SearchSyncConfig) -> Self {
        let ManagerInputs {
            initial_state,
            control_group,
            time_restore,
            panels_loaded,
            last_saved_state,
            services,
            options,
        } = inputs;
        let options = options.unwrap_or_default();

        let shared = Arc::new(Shared {
            cells: SearchCells::new(&initial_state),
            services,
            time_restore,
            sync_with_services: options.use_unified_search_integration,
            control_group_reload: Pulse::new(),
            panels_reload: Pulse::new(),
            comparison_debounce: cfg.comparison_debounce(),
        });

        let control_subscriptions = Subscriptions::new();
        control_subscriptions.add(control_group::fold(&shared.cells, control_group));

        let integration = Subscriptions::new();
        let stop_syncing = Subscriptions::new();
        if options.use_unified_search_integration
            && let Some(storage) = options.url_storage
        {
            let active = integration::activate(
                &shared,
                storage,
                panels_loaded,
                last_saved_state,
                cfg,
            );
            for subscription in active.reactions {
                integration.add(subscription);
            }
            let url_sync = active.url_sync;
            stop_syncing.add(Subscription::from_fn(move || url_sync.stop()));
            stop_syncing.add(active.binding);
        } else {
            debug!("unified search integration disabled");
        }

        Self {
            api: SearchApi {
                shared: Arc::clone(&shared),
            },
            internal: InternalSearchApi { shared },
            control_group: control_subscriptions,
            integration,
            stop_syncing,
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> SearchApi {
        self.api.clone()
    }

    pub fn internal_api(&self) -> InternalSearchApi {
        self.internal.clone()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    /// Stop every reaction and the URL/service syncing. Later calls are no-ops.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        self.control_group.unsubscribe();
        self.integration.unsubscribe();
        self.stop_syncing.unsubscribe();
        debug!("search manager cleaned up");
    }
}

impl Drop for SearchManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
