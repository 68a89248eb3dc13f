//! Simulated I/O latency.
//!
//! Every adapter call sleeps for a configured window before doing anything
//! else. The wait is deadline based: the deadline is fixed once, and each
//! wake-up re-checks the clock and waits again only for what is left, so an
//! early wake never restarts the full interval. A shared [`CancelSignal`]
//! cuts the wait short; that is not an error, the call simply finishes early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, Thread, ThreadId};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;

/// How a single delay step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// Nothing to wait for (no delay configured, or a zero draw).
    Skipped,
    /// The deadline was reached.
    Elapsed,
    /// The cancel signal fired before the deadline.
    Cancelled,
}

struct CancelInner {
    cancelled: AtomicBool,
    notify: watch::Sender<bool>,
    parked: Mutex<Vec<Thread>>,
}

/// Cloneable cancellation flag shared by every worker of a run.
///
/// Async waiters observe it through a watch channel, blocking waiters are
/// unparked directly.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                notify,
                parked: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.notify.send_replace(true);
        let parked = self
            .inner
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for thread in parked.iter() {
            thread.unpark();
        }
        tracing::debug!(woken = parked.len(), "delay cancellation signalled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.notify.subscribe()
    }

    fn register_current_thread(&self) -> ParkRegistration<'_> {
        let current = thread::current();
        let id = current.id();
        self.inner
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(current);
        ParkRegistration { signal: self, id }
    }
}

struct ParkRegistration<'a> {
    signal: &'a CancelSignal,
    id: ThreadId,
}

impl Drop for ParkRegistration<'_> {
    fn drop(&mut self) {
        self.signal
            .inner
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|thread| thread.id() != self.id);
    }
}

/// Per-instance latency generator. Owns its random source so adapters on
/// different workers never contend on a shared generator.
pub struct Delay {
    delay_millis: u64,
    randomize: bool,
    rng: SmallRng,
}

impl Delay {
    pub fn new(delay_millis: u64, randomize: bool) -> Self {
        Self {
            delay_millis,
            randomize,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(delay_millis: u64, randomize: bool, seed: u64) -> Self {
        Self {
            delay_millis,
            randomize,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Draw the length of the next wait. `None` means return immediately.
    ///
    /// Randomized delays are uniform over `[0, delay_millis)` milliseconds;
    /// a draw of zero nanoseconds skips the wait.
    pub fn plan(&mut self) -> Option<Duration> {
        if self.delay_millis == 0 {
            return None;
        }
        if self.randomize {
            let millis = self.rng.gen_range(0..self.delay_millis);
            let delay = Duration::from_millis(millis);
            if delay.as_nanos() == 0 {
                return None;
            }
            Some(delay)
        } else {
            Some(Duration::from_millis(self.delay_millis))
        }
    }

    /// Wait out the next planned delay on the async runtime.
    pub async fn apply(&mut self, cancel: &CancelSignal) -> DelayOutcome {
        match self.plan() {
            Some(delay) => sleep_until(tokio::time::Instant::now() + delay, cancel).await,
            None => DelayOutcome::Skipped,
        }
    }

    /// Wait out the next planned delay by parking the calling thread.
    pub fn apply_blocking(&mut self, cancel: &CancelSignal) -> DelayOutcome {
        match self.plan() {
            Some(delay) => park_until(std::time::Instant::now() + delay, cancel),
            None => DelayOutcome::Skipped,
        }
    }
}

/// Suspend the current task until `deadline`, or until `cancel` fires.
pub async fn sleep_until(deadline: tokio::time::Instant, cancel: &CancelSignal) -> DelayOutcome {
    let mut notified = cancel.subscribe();
    loop {
        if cancel.is_cancelled() {
            return DelayOutcome::Cancelled;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            changed = notified.changed() => {
                if changed.is_err() {
                    tokio::time::sleep_until(deadline).await;
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return DelayOutcome::Elapsed;
        }
    }
}

/// Park the current thread until `deadline`, or until `cancel` fires.
///
/// `park_timeout` may return early for no reason; the loop re-parks for the
/// remaining time only.
pub fn park_until(deadline: std::time::Instant, cancel: &CancelSignal) -> DelayOutcome {
    let _registration = cancel.register_current_thread();
    let mut now = std::time::Instant::now();
    while now < deadline {
        if cancel.is_cancelled() {
            return DelayOutcome::Cancelled;
        }
        thread::park_timeout(deadline - now);
        now = std::time::Instant::now();
    }
    DelayOutcome::Elapsed
}
