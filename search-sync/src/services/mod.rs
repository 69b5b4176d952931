//! Collaborators the synchronizer talks to.
//!
//! Every collaborator is a trait object handed to the synchronizer explicitly
//! (see [`SearchServices`]); there is no ambient lookup. [`memory`] holds
//! in-process implementations used by tests and the CLI.

pub mod memory;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::warn;

use crate::core::filters::Filter;
use crate::core::types::{
    EsqlVariable, GlobalQueryState, Query, RefreshInterval, TimeRange, TimeSlice,
};

/// Completion handle carried by an auto-refresh firing.
///
/// Call [`AutoRefreshDone::complete`] once the refresh cycle finished.
/// Dropping the handle without completing abandons the cycle.
#[derive(Debug)]
pub struct AutoRefreshDone {
    tx: Option<oneshot::Sender<()>>,
}

impl AutoRefreshDone {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn complete(mut self) {
        if let Some(tx) = self.tx.take() {
            // The service may have stopped waiting; nothing to do then.
            let _ = tx.send(());
        }
    }
}

/// Global time picker state.
pub trait TimeFilterService: Send + Sync {
    fn time(&self) -> TimeRange;
    fn set_time(&self, time: TimeRange);
    fn time_defaults(&self) -> TimeRange;
    fn refresh_interval(&self) -> RefreshInterval;
    fn set_refresh_interval(&self, interval: RefreshInterval);
    fn refresh_interval_defaults(&self) -> RefreshInterval;
    /// Fires after the time changed.
    fn time_updates(&self) -> broadcast::Receiver<()>;
    /// Fires after the refresh interval changed.
    fn refresh_interval_updates(&self) -> broadcast::Receiver<()>;
    /// One handle per auto-refresh tick for this subscriber.
    fn auto_refresh_fetches(&self) -> mpsc::UnboundedReceiver<AutoRefreshDone>;
}

/// Shared query bar and filter bar state.
pub trait QueryService: Send + Sync {
    fn default_query(&self) -> Query;
    fn query(&self) -> Query;
    fn set_query(&self, query: Query);
    /// Pinned filters followed by app filters.
    fn filters(&self) -> Vec<Filter>;
    fn app_filters(&self) -> Vec<Filter>;
    /// Replace all filters; pinned ones go to the global store.
    fn set_filters(&self, filters: Vec<Filter>);
    fn set_app_filters(&self, filters: Vec<Filter>);
    /// Fires after the query or any filter changed.
    fn updates(&self) -> broadcast::Receiver<()>;
}

/// Key/value state persisted in the page URL.
pub trait UrlStateStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    /// Write without raising a change notification.
    fn set(&self, key: &str, value: Value);
    /// Keys changed by navigation outside this process.
    fn changes(&self) -> broadcast::Receiver<String>;
}

/// External component contributing filters, a time slice, and ES|QL variables.
pub trait ControlGroupApi: Send + Sync {
    fn filters(&self) -> watch::Receiver<Option<Vec<Filter>>>;
    fn time_slice(&self) -> watch::Receiver<Option<TimeSlice>>;
    fn esql_variables(&self) -> watch::Receiver<Vec<EsqlVariable>>;
}

/// Service handles passed to the synchronizer.
#[derive(Clone)]
pub struct SearchServices {
    pub time_filter: Arc<dyn TimeFilterService>,
    pub query: Arc<dyn QueryService>,
}

/// Decode the global state stored under `key`.
///
/// A malformed payload is treated as absent.
pub fn global_query_state(storage: &dyn UrlStateStorage, key: &str) -> Option<GlobalQueryState> {
    let raw = storage.get(key)?;
    match serde_json::from_value(raw) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(key = %key, error = %err, "ignoring malformed global url state");
            None
        }
    }
}
