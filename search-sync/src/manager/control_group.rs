//! Folding control-group contributions into the search state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::core::filters::Filter;
use crate::core::state_update::combine_filters;
use crate::core::types::{EsqlVariable, TimeSlice};
use crate::reactive::{Subscription, SwitchedReceiver};
use crate::services::ControlGroupApi;

use super::SearchCells;

type ControlGroupHandle = Option<Arc<dyn ControlGroupApi>>;

struct Followed {
    filters: SwitchedReceiver<Option<Vec<Filter>>>,
    time_slice: SwitchedReceiver<Option<TimeSlice>>,
    esql_variables: SwitchedReceiver<Vec<EsqlVariable>>,
}

impl Followed {
    fn new(handle: &ControlGroupHandle) -> Self {
        Self {
            filters: SwitchedReceiver::new(handle.as_ref().map(|api| api.filters())),
            time_slice: SwitchedReceiver::new(handle.as_ref().map(|api| api.time_slice())),
            esql_variables: SwitchedReceiver::new(handle.as_ref().map(|api| api.esql_variables())),
        }
    }

    fn switch(&mut self, handle: &ControlGroupHandle) {
        self.filters.switch(handle.as_ref().map(|api| api.filters()));
        self.time_slice.switch(handle.as_ref().map(|api| api.time_slice()));
        self.esql_variables
            .switch(handle.as_ref().map(|api| api.esql_variables()));
    }

    fn control_filters(&self) -> Option<Vec<Filter>> {
        self.filters.current().flatten()
    }
}

fn refold_filters(cells: &SearchCells, followed: &Followed) {
    let control = followed.control_filters();
    let combined = cells
        .local_filters
        .with(|local| combine_filters(local.as_deref(), control.as_deref()));
    if cells.filters.set(combined) {
        trace!("combined filters changed");
    }
}

/// Keep the combined filters, time slice, and ES|QL variables in step with
/// the local filters and whichever control group is current.
///
/// The current values are applied before returning; later changes are handled
/// by the returned subscription.
pub(super) fn fold(
    cells: &SearchCells,
    mut control_group: watch::Receiver<ControlGroupHandle>,
) -> Subscription {
    let handle = control_group.borrow_and_update().clone();
    let mut followed = Followed::new(&handle);
    let mut local = cells.local_filters.subscribe();

    refold_filters(cells, &followed);
    cells.time_slice.set(followed.time_slice.current().flatten());
    cells
        .esql_variables
        .set(followed.esql_variables.current().unwrap_or_default());

    let cells = cells.clone();
    Subscription::spawn(async move {
        let mut outer_open = true;
        loop {
            tokio::select! {
                changed = control_group.changed(), if outer_open => {
                    if changed.is_err() {
                        // Keep following the last control group.
                        outer_open = false;
                        continue;
                    }
                    let handle = control_group.borrow_and_update().clone();
                    debug!(present = handle.is_some(), "control group switched");
                    followed.switch(&handle);
                    refold_filters(&cells, &followed);
                    cells.time_slice.set(followed.time_slice.current().flatten());
                    cells
                        .esql_variables
                        .replace(followed.esql_variables.current().unwrap_or_default());
                }
                changed = local.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    local.borrow_and_update();
                    refold_filters(&cells, &followed);
                }
                () = followed.filters.changed() => refold_filters(&cells, &followed),
                () = followed.time_slice.changed() => {
                    cells.time_slice.set(followed.time_slice.current().flatten());
                }
                () = followed.esql_variables.changed() => {
                    cells
                        .esql_variables
                        .replace(followed.esql_variables.current().unwrap_or_default());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::FilterMeta;
    use crate::core::types::{EsqlValue, EsqlVariableType, SearchState};
    use crate::services::memory::MemoryControlGroup;
    use std::time::Duration;

    fn filter(key: &str) -> Filter {
        Filter {
            meta: FilterMeta {
                key: Some(key.to_string()),
                ..FilterMeta::default()
            },
            ..Filter::default()
        }
    }

    fn cells_with(local: Option<Vec<Filter>>) -> SearchCells {
        SearchCells::new(&SearchState {
            filters: local,
            ..SearchState::default()
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn current_control_group_is_applied_before_returning() {
        let group = MemoryControlGroup::new();
        group.set_filters(Some(vec![filter("control")]));
        group.set_time_slice(Some(TimeSlice(10, 20)));
        let handle: ControlGroupHandle = Some(Arc::new(group));
        let (_tx, rx) = watch::channel(handle);

        let cells = cells_with(Some(vec![filter("local")]));
        let _sub = fold(&cells, rx);

        assert_eq!(cells.filters.get(), vec![filter("local"), filter("control")]);
        assert_eq!(cells.time_slice.get(), Some(TimeSlice(10, 20)));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_control_groups_follows_the_latest() {
        let first = MemoryControlGroup::new();
        first.set_filters(Some(vec![filter("first")]));
        let second = MemoryControlGroup::new();
        second.set_filters(Some(vec![filter("second")]));
        second.set_esql_variables(vec![EsqlVariable {
            key: "interval".to_string(),
            value: EsqlValue::Text("1h".to_string()),
            kind: EsqlVariableType::TimeLiteral,
        }]);

        let (tx, rx) = watch::channel::<ControlGroupHandle>(None);
        let cells = cells_with(None);
        let _sub = fold(&cells, rx);
        assert!(cells.filters.get().is_empty());

        tx.send_replace(Some(Arc::new(first.clone())));
        settle().await;
        assert_eq!(cells.filters.get(), vec![filter("first")]);

        tx.send_replace(Some(Arc::new(second)));
        settle().await;
        assert_eq!(cells.filters.get(), vec![filter("second")]);
        assert_eq!(cells.esql_variables.get().len(), 1);

        // The previous control group no longer contributes.
        first.set_filters(Some(vec![filter("stale")]));
        settle().await;
        assert_eq!(cells.filters.get(), vec![filter("second")]);

        tx.send_replace(None);
        settle().await;
        assert!(cells.filters.get().is_empty());
        assert!(cells.esql_variables.get().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_tick_changes_emit_one_combined_value() {
        let group = MemoryControlGroup::new();
        let handle: ControlGroupHandle = Some(Arc::new(group.clone()));
        let (_tx, rx) = watch::channel(handle);
        let cells = cells_with(None);
        let _sub = fold(&cells, rx);
        let mut combined = cells.filters.subscribe();

        cells.local_filters.set(Some(vec![filter("local")]));
        group.set_filters(Some(vec![filter("control")]));
        settle().await;

        assert!(combined.has_changed().expect("open"));
        assert_eq!(
            *combined.borrow_and_update(),
            vec![filter("local"), filter("control")]
        );
        settle().await;
        assert!(!combined.has_changed().expect("open"));
    }

    #[tokio::test(start_paused = true)]
    async fn equal_time_slice_does_not_notify() {
        let group = MemoryControlGroup::new();
        group.set_time_slice(Some(TimeSlice(1, 2)));
        let handle: ControlGroupHandle = Some(Arc::new(group.clone()));
        let (_tx, rx) = watch::channel(handle);
        let cells = cells_with(None);
        let _sub = fold(&cells, rx);
        let slice = cells.time_slice.subscribe();

        group.set_time_slice(Some(TimeSlice(1, 2)));
        settle().await;
        assert!(!slice.has_changed().expect("open"));
    }
}
