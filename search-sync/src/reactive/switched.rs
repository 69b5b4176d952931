//! Follow the latest inner publisher of an outer publisher.

use std::future::pending;

use futures::StreamExt;
use futures::stream::{BoxStream, SelectAll};
use tokio::sync::watch;

/// Receiver that can be swapped for another one at any time.
///
/// Changes are only reported for the receiver currently followed; switching
/// drops the previous one. While absent or closed, [`SwitchedReceiver::changed`]
/// never resolves and [`SwitchedReceiver::current`] keeps the last value.
#[derive(Debug)]
pub struct SwitchedReceiver<T> {
    inner: Option<watch::Receiver<T>>,
    closed: bool,
}

impl<T: Clone> SwitchedReceiver<T> {
    pub fn new(inner: Option<watch::Receiver<T>>) -> Self {
        let mut switched = Self {
            inner: None,
            closed: false,
        };
        switched.switch(inner);
        switched
    }

    /// Follow `next` from now on; its current value counts as seen.
    pub fn switch(&mut self, next: Option<watch::Receiver<T>>) {
        self.inner = next.map(|mut rx| {
            rx.borrow_and_update();
            rx
        });
        self.closed = false;
    }

    pub fn current(&self) -> Option<T> {
        self.inner.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Resolves when the followed receiver sees a new value.
    pub async fn changed(&mut self) {
        if self.closed {
            return pending().await;
        }
        let Some(rx) = self.inner.as_mut() else {
            return pending().await;
        };
        if rx.changed().await.is_err() {
            self.closed = true;
            pending::<()>().await;
        }
    }
}

/// Stream yielding `()` for every change seen by `rx`; ends when the sender
/// is dropped.
pub fn change_stream<T>(rx: watch::Receiver<T>) -> BoxStream<'static, ()>
where
    T: Send + Sync + 'static,
{
    futures::stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        Some(((), rx))
    })
    .boxed()
}

/// Merge several change streams; ends when all of them end.
pub fn merge_changes(
    streams: impl IntoIterator<Item = BoxStream<'static, ()>>,
) -> SelectAll<BoxStream<'static, ()>> {
    futures::stream::select_all(streams)
}
