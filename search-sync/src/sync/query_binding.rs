//! Two-way binding between local query/filter state and the query service.
//!
//! The binding is two one-directional flows run by a single task:
//!
//! - **push** (local to service): each value from the local state stream is
//!   written to the service, field by field, only where it differs.
//! - **pull** (service to local): each service update is written to the local
//!   state, only where it differs.
//!
//! Echo suppression: a value the task just pulled from the service is never
//! pushed back to it, even if the local stream replays it.
//!
//! Filters are bound as one list. The service keeps pinned entries in its
//! global store and the rest as app filters.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::core::filters::{clean_filters_for_serialize, compare_filters, with_missing_pinned};
use crate::core::types::QueryState;
use crate::reactive::Subscription;
use crate::services::QueryService;

/// Local side of the binding: read, write, and observe.
pub struct QueryStateBinding {
    pub get: Box<dyn Fn() -> QueryState + Send + Sync>,
    pub set: Box<dyn Fn(QueryState) + Send + Sync>,
    pub state: BoxStream<'static, QueryState>,
}

/// Which parts of the state are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTargets {
    pub query: bool,
    pub filters: bool,
}

impl SyncTargets {
    pub const ALL: SyncTargets = SyncTargets {
        query: true,
        filters: true,
    };
}

/// Bind `binding` to `service` until the returned subscription is dropped.
///
/// On connect, pinned filters only the service knows are adopted locally, the
/// result is pushed, and the service state is pulled back.
pub fn connect_to_query_state(
    service: Arc<dyn QueryService>,
    binding: QueryStateBinding,
    targets: SyncTargets,
) -> Subscription {
    let QueryStateBinding { get, set, mut state } = binding;
    let mut updates = service.updates();

    let local = get();
    let mut initial = local.clone();
    if targets.filters {
        initial.filters = with_missing_pinned(&initial.filters, &service.filters());
    }
    push(service.as_ref(), &initial, targets);
    if let Some(pulled) = pull(service.as_ref(), &initial, targets) {
        initial = pulled;
    }
    let mut last_pulled = (initial != local).then(|| {
        set(initial.clone());
        initial
    });

    Subscription::spawn(async move {
        loop {
            tokio::select! {
                next = state.next() => {
                    let Some(local) = next else {
                        break;
                    };
                    if last_pulled.take().as_ref() == Some(&local) {
                        trace!("skipping echo of pulled query state");
                        continue;
                    }
                    push(service.as_ref(), &local, targets);
                }
                update = updates.recv() => {
                    if matches!(update, Err(broadcast::error::RecvError::Closed)) {
                        break;
                    }
                    if let Some(pulled) = pull(service.as_ref(), &get(), targets) {
                        last_pulled = Some(pulled.clone());
                        set(pulled);
                    }
                }
            }
        }
        debug!("query state binding ended");
    })
}

fn push(service: &dyn QueryService, local: &QueryState, targets: SyncTargets) {
    if targets.query && service.query() != local.query {
        debug!(query = %local.query.query, "pushing query to query service");
        service.set_query(local.query.clone());
    }
    if targets.filters && !compare_filters(&local.filters, &service.filters()) {
        debug!(filters = local.filters.len(), "pushing filters to query service");
        service.set_filters(local.filters.clone());
    }
}

/// The local state after taking the service's values, or `None` when nothing
/// differs.
fn pull(service: &dyn QueryService, local: &QueryState, targets: SyncTargets) -> Option<QueryState> {
    let mut next = local.clone();
    let mut changed = false;
    if targets.query {
        let query = service.query();
        if query != local.query {
            next.query = query;
            changed = true;
        }
    }
    if targets.filters {
        let filters = clean_filters_for_serialize(service.filters());
        if !compare_filters(&filters, &local.filters) {
            next.filters = filters;
            changed = true;
        }
    }
    if changed {
        debug!(filters = next.filters.len(), "pulled query state from query service");
    }
    changed.then_some(next)
}
