use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;

/// Why a wait ended without the condition being met
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitError {
    #[error("timed out")]
    Elapsed,
    #[error("signal was dropped")]
    Closed,
}

/// Single-fire wait condition
///
/// Once set it stays set, and every later wait returns immediately.
#[derive(Debug)]
pub(crate) struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    /// Create an unset latch
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Set the latch and wake every waiter
    pub fn set(&self) {
        self.tx.send_if_modified(|set| !std::mem::replace(set, true));
    }

    /// Whether the latch has been set
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch is set, at most `limit`
    pub async fn wait(&self, limit: Duration) -> Result<(), WaitError> {
        let mut rx = self.tx.subscribe();
        let set = timeout(limit, async { rx.wait_for(|set| *set).await.map(|_| ()) })
            .await
            .map_err(|_| WaitError::Elapsed)?;
        set.map_err(|_| WaitError::Closed)
    }
}

/// Re-armable wait condition
///
/// A waiter only sees pulses fired after it was armed.
#[derive(Debug)]
pub(crate) struct Pulse {
    tx: watch::Sender<u64>,
}

/// Armed waiter for the next [`Pulse::fire`]
pub(crate) struct PulseWaiter {
    rx: watch::Receiver<u64>,
}

impl Pulse {
    /// Create a pulse that has never fired
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Wake every armed waiter
    pub fn fire(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Arm a waiter before triggering whatever will fire the pulse
    pub fn arm(&self) -> PulseWaiter {
        PulseWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl PulseWaiter {
    /// Wait for the next fire, at most `limit`
    ///
    /// Fails with [`WaitError::Closed`] if the pulse is dropped first.
    pub async fn wait(mut self, limit: Duration) -> Result<(), WaitError> {
        let fired = timeout(limit, self.rx.changed())
            .await
            .map_err(|_| WaitError::Elapsed)?;
        fired.map_err(|_| WaitError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_latch_stays_set() {
        let latch = Latch::new();
        assert_eq!(latch.wait(Duration::from_millis(10)).await, Err(WaitError::Elapsed));

        latch.set();
        latch.set();
        assert!(latch.is_set());
        assert!(latch.wait(Duration::from_millis(10)).await.is_ok());
        assert!(latch.wait(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pulse_ignores_earlier_fires() {
        let pulse = Pulse::new();
        pulse.fire();

        let waiter = pulse.arm();
        assert_eq!(waiter.wait(Duration::from_millis(10)).await, Err(WaitError::Elapsed));

        let waiter = pulse.arm();
        pulse.fire();
        assert!(waiter.wait(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pulse_wakes_pending_waiter() {
        let pulse = Arc::new(Pulse::new());
        let waiter = pulse.arm();

        let firing = pulse.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            firing.fire();
        });

        assert!(waiter.wait(Duration::from_secs(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pulse_dropped_is_not_a_fire() {
        let pulse = Pulse::new();
        let waiter = pulse.arm();
        drop(pulse);

        assert_eq!(waiter.wait(Duration::from_secs(2)).await, Err(WaitError::Closed));
    }
}
