//! Cooperative cancellation and cancellable cooldowns

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Requests that a run stop
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observed by a run between items and during cooldowns
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Linked handle and signal
#[must_use]
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

impl AbortHandle {
    /// Request abort; idempotent
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Signal linked to this handle
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// Signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // a closed channel keeps its last value
        drop(tx);
        Self { rx }
    }

    /// Whether abort was requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once abort is requested
    ///
    /// Pends forever when the handle is dropped without aborting.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// How a countdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// The full duration elapsed
    Elapsed,
    /// Abort was requested first
    Aborted,
}

/// Cancellable countdown reporting remaining time every tick
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    duration: Duration,
    tick: Duration,
}

impl Countdown {
    /// Countdown of `duration`, ticking every `tick`
    #[inline]
    #[must_use]
    pub fn new(duration: Duration, tick: Duration) -> Self {
        Self {
            duration,
            tick: if tick.is_zero() { duration } else { tick },
        }
    }

    /// Run the countdown, calling `on_tick` with the remaining time before
    /// each sleep step
    pub async fn run<F>(&self, signal: &mut AbortSignal, mut on_tick: F) -> CountdownOutcome
    where
        F: FnMut(Duration),
    {
        let mut remaining = self.duration;
        while !remaining.is_zero() {
            if signal.is_aborted() {
                return CountdownOutcome::Aborted;
            }
            on_tick(remaining);
            let step = remaining.min(self.tick);
            tokio::select! {
                biased;
                () = signal.aborted() => return CountdownOutcome::Aborted,
                () = tokio::time::sleep(step) => {}
            }
            remaining = remaining.saturating_sub(step);
        }
        CountdownOutcome::Elapsed
    }
}
