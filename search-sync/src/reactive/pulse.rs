//! Value-less event channels (reload requests, load-completion signals).

use tokio::sync::broadcast;

const PULSE_CAPACITY: usize = 16;

/// Fan-out notification with no payload.
///
/// Only receivers that exist at emit time observe an emission.
#[derive(Debug, Clone)]
pub struct Pulse {
    tx: broadcast::Sender<()>,
}

impl Default for Pulse {
    fn default() -> Self {
        Self::new()
    }
}

impl Pulse {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PULSE_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self) {
        // No receivers is fine: nobody is listening for this cycle.
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

/// Wait for the next emission.
///
/// Lagging counts as an emission. Returns `false` once the pulse is gone.
pub async fn next_pulse(rx: &mut broadcast::Receiver<()>) -> bool {
    match rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => true,
        Err(broadcast::error::RecvError::Closed) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_each_emit() {
        let pulse = Pulse::new();
        let mut a = pulse.subscribe();
        let mut b = pulse.subscribe();
        pulse.emit();
        assert!(next_pulse(&mut a).await);
        assert!(next_pulse(&mut b).await);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_pulse_ends_wait() {
        let pulse = Pulse::new();
        let mut rx = pulse.subscribe();
        drop(pulse);
        assert!(!next_pulse(&mut rx).await);
    }
}
