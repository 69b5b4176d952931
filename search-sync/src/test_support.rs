//! Test-only fixtures: filters, saved states, and a harness of in-memory
//! services wired to a [`SearchManager`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::core::filters::{Filter, FilterMeta};
use crate::core::types::{Query, RefreshInterval, SearchState, TimeRange};
use crate::io::config::SearchSyncConfig;
use crate::manager::{CreationOptions, ManagerInputs, SearchManager};
use crate::reactive::Pulse;
use crate::services::memory::{
    MemoryControlGroup, MemoryQueryService, MemoryTimeFilter, MemoryUrlStorage,
};
use crate::services::{ControlGroupApi, SearchServices, UrlStateStorage};

/// Unpinned filter on `key`, distinguishable by key alone.
pub fn filter(key: &str) -> Filter {
    Filter {
        meta: FilterMeta {
            key: Some(key.to_string()),
            ..FilterMeta::default()
        },
        query: Some(serde_json::json!({ "exists": { "field": key } })),
        ..Filter::default()
    }
}

pub fn pinned_filter(key: &str) -> Filter {
    filter(key).pin()
}

/// Saved state with the given time settings and an empty query.
pub fn saved_state(time_range: Option<TimeRange>, time_restore: bool) -> SearchState {
    SearchState {
        filters: Some(Vec::new()),
        query: Some(Query::new("", "kuery")),
        refresh_interval: Some(RefreshInterval {
            pause: true,
            value: 60_000,
        }),
        time_range,
        time_restore: Some(time_restore),
    }
}

/// Let spawned reactions and zero-length timers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// In-memory collaborators plus the publishers a dashboard would own.
pub struct Harness {
    pub cfg: SearchSyncConfig,
    pub time_filter: Arc<MemoryTimeFilter>,
    pub query: Arc<MemoryQueryService>,
    pub storage: Arc<MemoryUrlStorage>,
    pub control_group: MemoryControlGroup,
    pub control_group_tx: watch::Sender<Option<Arc<dyn ControlGroupApi>>>,
    pub time_restore_tx: watch::Sender<Option<bool>>,
    pub panels_loaded: Pulse,
    last_saved: Arc<Mutex<Option<SearchState>>>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let cfg = SearchSyncConfig::default();
        let (control_group_tx, _) = watch::channel(None);
        let (time_restore_tx, _) = watch::channel(None);
        Self {
            time_filter: Arc::new(MemoryTimeFilter::from_config(&cfg)),
            query: Arc::new(MemoryQueryService::from_config(&cfg)),
            storage: Arc::new(MemoryUrlStorage::new()),
            control_group: MemoryControlGroup::new(),
            control_group_tx,
            time_restore_tx,
            panels_loaded: Pulse::new(),
            last_saved: Arc::new(Mutex::new(None)),
            cfg,
        }
    }

    pub fn services(&self) -> SearchServices {
        SearchServices {
            time_filter: self.time_filter.clone(),
            query: self.query.clone(),
        }
    }

    pub fn set_time_restore(&self, time_restore: bool) {
        self.time_restore_tx.send_replace(Some(time_restore));
    }

    pub fn set_last_saved(&self, state: Option<SearchState>) {
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Publish the harness control group as the current one.
    pub fn attach_control_group(&self) {
        self.control_group_tx
            .send_replace(Some(Arc::new(self.control_group.clone())));
    }

    pub fn inputs(&self, initial_state: SearchState, integration: bool) -> ManagerInputs {
        let last_saved = Arc::clone(&self.last_saved);
        ManagerInputs {
            initial_state,
            control_group: self.control_group_tx.subscribe(),
            time_restore: self.time_restore_tx.subscribe(),
            panels_loaded: self.panels_loaded.clone(),
            last_saved_state: Arc::new(move || {
                last_saved
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            }),
            services: self.services(),
            options: Some(CreationOptions {
                use_unified_search_integration: integration,
                url_storage: integration.then(|| {
                    let storage: Arc<dyn UrlStateStorage> = self.storage.clone();
                    storage
                }),
            }),
        }
    }

    pub fn start(&self, initial_state: SearchState, integration: bool) -> SearchManager {
        SearchManager::initialize(self.inputs(initial_state, integration), &self.cfg)
    }
}
