//! Explicit subscription lifetimes.
//!
//! Every background reaction is owned by a [`Subscription`]; related
//! subscriptions are collected in a [`Subscriptions`] disposer that tears them
//! all down at once.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;

enum Teardown {
    Task(JoinHandle<()>),
    Stop(Box<dyn FnOnce() + Send>),
}

/// Unsubscribe handle. Tearing down happens at most once, on
/// [`Subscription::unsubscribe`] or on drop.
pub struct Subscription {
    teardown: Option<Teardown>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.teardown {
            Some(Teardown::Task(_)) => "task",
            Some(Teardown::Stop(_)) => "stop",
            None => "closed",
        };
        f.debug_struct("Subscription").field("kind", &kind).finish()
    }
}

impl Subscription {
    /// Spawn `future` on the current runtime and own it.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::task(tokio::spawn(future))
    }

    pub fn task(handle: JoinHandle<()>) -> Self {
        Self {
            teardown: Some(Teardown::Task(handle)),
        }
    }

    /// Run `stop` on unsubscribe.
    pub fn from_fn(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Teardown::Stop(Box::new(stop))),
        }
    }

    pub fn unsubscribe(&mut self) {
        match self.teardown.take() {
            Some(Teardown::Task(handle)) => handle.abort(),
            Some(Teardown::Stop(stop)) => stop(),
            None => {}
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Aggregate disposer.
///
/// Once unsubscribed, subscriptions added later are torn down immediately.
#[derive(Debug)]
pub struct Subscriptions {
    items: Mutex<Option<Vec<Subscription>>>,
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriptions {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn add(&self, mut subscription: Subscription) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match items.as_mut() {
            Some(items) => items.push(subscription),
            None => subscription.unsubscribe(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Tear down everything, in insertion order. Returns `false` when already
    /// unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        let taken = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(items) => {
                for mut item in items {
                    item.unsubscribe();
                }
                true
            }
            None => false,
        }
    }
}
