//! Interval Poller (`spec.md` §4.10): a reusable tick-driven background
//! task, shared by the Scheduled-Job Runner and the Background Watcher.
//!
//! Idempotent `start()`, skip-on-overlap (no queueing of missed ticks),
//! `stop()` awaits any in-flight tick before returning. Grounded on the
//! atomic-flag-plus-`JoinHandle` shutdown pattern used elsewhere in the
//! retrieved corpus (`pcastone-orca`'s `ShutdownCoordinator`).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, instrument};

type TickFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// `createIntervalPoller(fn, intervalMs) → {start(), stop(), isRunning()}`
/// (`spec.md` §4.10).
pub struct IntervalPoller {
    tick: TickFn,
    interval: Duration,
    running: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    /// Wakes the spawned loop out of a `ticker.tick()` wait the instant
    /// `stop()` is called, instead of leaving it to sleep out the rest of
    /// the current interval.
    stop_notify: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalPoller {
    pub fn new<F, Fut>(interval: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            tick: Arc::new(move || Box::pin(tick())),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starting an already-running poller is a no-op (`spec.md` §4.10
    /// "idempotent start").
    #[instrument(level = "debug", skip(self))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let tick = self.tick.clone();
        let interval = self.interval;
        let running = self.running.clone();
        let busy = self.busy.clone();
        let stop_notify = self.stop_notify.clone();

        let spawned = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_notify.notified() => break,
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                // Skip-on-overlap: a tick still in flight is not queued,
                // the next ticker fire is simply dropped (`spec.md` §4.10).
                if busy.swap(true, Ordering::SeqCst) {
                    continue;
                }
                let result = std::panic::AssertUnwindSafe(tick()).catch_unwind().await;
                if let Err(panic) = result {
                    error!(?panic, "interval poller tick panicked, continuing");
                }
                busy.store(false, Ordering::SeqCst);
            }
        });

        *self.handle.lock().await = Some(spawned);
    }

    /// Stops the ticker and awaits any in-flight tick before returning
    /// (`spec.md` §4.10 "stop() awaits in-flight work"). Never aborts the
    /// spawned task: a tick already running is left to finish naturally.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_one();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
