//! Quiet-period timer for debounced emissions.

use std::future::pending;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Fires once no change has been reported for `quiet`.
///
/// With a zero quiet period the timer still waits for the runtime to turn, so
/// every change made in the same tick is coalesced into one firing.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Idle timer.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Timer that is already counting down, for an initial emission.
    pub fn armed(quiet: Duration) -> Self {
        let mut debouncer = Self::new(quiet);
        debouncer.poke();
        debouncer
    }

    /// (Re)start the quiet period.
    pub fn poke(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet);
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the quiet period elapses, then disarms. Never resolves
    /// while idle.
    pub async fn fired(&mut self) {
        let Some(deadline) = self.deadline else {
            return pending().await;
        };
        sleep_until(deadline).await;
        self.deadline = None;
    }
}
