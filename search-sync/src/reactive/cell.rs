//! Observable state cells backed by `tokio::sync::watch`.

use std::sync::Arc;

use tokio::sync::watch;

/// A value with change notification.
///
/// Readers hold a [`watch::Receiver`] from [`StateCell::subscribe`]; only the
/// owner of the cell can write. Clones share the same value.
#[derive(Debug)]
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq,
{
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Store `value` unless it is structurally equal to the current value.
    ///
    /// Returns whether subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Store `value` and notify even when it is unchanged.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// New receiver; the current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_write_does_not_notify() {
        let cell = StateCell::new(vec![1, 2]);
        let rx = cell.subscribe();

        assert!(!cell.set(vec![1, 2]));
        assert!(!rx.has_changed().expect("open"));

        assert!(cell.set(vec![3]));
        assert!(rx.has_changed().expect("open"));
        assert_eq!(cell.get(), vec![3]);
    }

    #[test]
    fn replace_always_notifies() {
        let cell = StateCell::new(1);
        let rx = cell.subscribe();
        cell.replace(1);
        assert!(rx.has_changed().expect("open"));
    }

    #[test]
    fn clones_share_value() {
        let cell = StateCell::new(None::<u8>);
        let other = cell.clone();
        other.set(Some(4));
        assert_eq!(cell.get(), Some(4));
        assert_eq!(cell.with(|v| v.map(|n| n * 2)), Some(8));
    }
}
