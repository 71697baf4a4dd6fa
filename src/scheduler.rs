/// Periodic refresh loop shared by every consumer.
///
/// One background thread wakes every `interval` and refreshes the union of
/// subscribed source ids. Consumers (screens, the HTTP endpoint) call
/// `subscribe(id)` and hold the returned `Subscription`; dropping it
/// unsubscribes. Subscriptions are reference-counted, so two screens
/// watching the same gauge cause one refresh per tick, and a source nobody
/// watches is not fetched at all.
///
/// A new subscription, or `refresh_now`, wakes the loop early so the
/// subscriber does not wait a full interval for its first reading.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::monitor::Monitor;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub struct SchedulerConfig {
    /// Time between refresh rounds (default: 5 minutes).
    pub interval: Duration,
    /// Also refresh NWS alerts each round (default: true).
    pub include_alerts: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            include_alerts: true,
        }
    }
}

/// What the scheduler drives each round.
pub trait Refresher: Send + 'static {
    fn refresh(&self, ids: &[String]);
    fn refresh_alerts(&self) {}
}

impl Refresher for Monitor {
    fn refresh(&self, ids: &[String]) {
        self.refresh_ids(ids);
    }

    fn refresh_alerts(&self) {
        // failures are logged by the monitor; the previous list is kept
        let _ = Monitor::refresh_alerts(self);
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Control {
    stop: bool,
    wake: bool,
}

#[derive(Default)]
struct Shared {
    /// Source id -> number of live subscriptions.
    subscriptions: Mutex<BTreeMap<String, usize>>,
    control: Mutex<Control>,
    signal: Condvar,
}

impl Shared {
    fn wake(&self) {
        lock(&self.control).wake = true;
        self.signal.notify_all();
    }

    fn subscribed_ids(&self) -> Vec<String> {
        lock(&self.subscriptions).keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Subscription guard
// ---------------------------------------------------------------------------

/// Keeps a source in the refresh set while alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Arc<Shared>,
    id: String,
}

impl Subscription {
    pub fn source_id(&self) -> &str {
        &self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = lock(&self.shared.subscriptions);
        if let Some(count) = subs.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                subs.remove(&self.id);
                debug!(source_id = %self.id, "last subscriber gone");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the refresh thread. The first round runs immediately.
    pub fn start<R: Refresher>(refresher: R, config: SchedulerConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let loop_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("refresh-scheduler".to_string())
            .spawn(move || run_loop(refresher, config, loop_shared));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "failed to spawn scheduler thread; refreshes disabled");
                None
            }
        };

        Self { shared, handle }
    }

    /// Adds one reference to `id` and wakes the loop.
    pub fn subscribe(&self, id: &str) -> Subscription {
        {
            let mut subs = lock(&self.shared.subscriptions);
            *subs.entry(id.to_string()).or_insert(0) += 1;
        }
        self.shared.wake();
        Subscription {
            shared: Arc::clone(&self.shared),
            id: id.to_string(),
        }
    }

    /// Currently subscribed ids, sorted.
    pub fn subscribed_ids(&self) -> Vec<String> {
        self.shared.subscribed_ids()
    }

    /// Runs a round now instead of waiting for the interval.
    pub fn refresh_now(&self) {
        self.shared.wake();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for the current round to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        lock(&self.shared.control).stop = true;
        self.shared.signal.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<R: Refresher>(refresher: R, config: SchedulerConfig, shared: Arc<Shared>) {
    info!(interval_secs = config.interval.as_secs(), "scheduler started");

    loop {
        let started = Instant::now();
        let ids = shared.subscribed_ids();

        if !ids.is_empty() {
            debug!(count = ids.len(), "refresh round");
            refresher.refresh(&ids);
            if config.include_alerts {
                refresher.refresh_alerts();
            }
        }

        let remaining = config.interval.saturating_sub(started.elapsed());
        let control = lock(&shared.control);
        let (mut control, _) = shared
            .signal
            .wait_timeout_while(control, remaining, |c| !c.stop && !c.wake)
            .unwrap_or_else(PoisonError::into_inner);

        if control.stop {
            break;
        }
        control.wake = false;
    }

    info!("scheduler stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
