//! Bounded reads for slow telemetry.
//!
//! Temperature and cycle-count queries can take seconds on some
//! hardware. Latency-sensitive callers run them through
//! [`with_timeout`]: the blocking read happens on an isolated worker
//! thread, and when the budget runs out the last-known-good value is
//! returned while the worker finishes in the background. The worker is
//! never killed mid-exchange; it keeps the facade mutex until done, so
//! later calls queue instead of corrupting the session.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::control::{BatteryControl, BatteryStatus};
use crate::session::SmcPort;

/// Last-known-good values for the slow readings.
#[derive(Default)]
pub struct TelemetryCache {
    inner: Mutex<Cached>,
}

#[derive(Default, Clone, Copy)]
struct Cached {
    temperature_c: Option<f32>,
    cycle_count: Option<u32>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        TelemetryCache::default()
    }

    pub fn temperature(&self) -> Option<f32> {
        lock(&self.inner).temperature_c
    }

    pub fn cycle_count(&self) -> Option<u32> {
        lock(&self.inner).cycle_count
    }

    /// Record fresh readings; `None` never evicts a known-good value.
    pub fn store(&self, temperature_c: Option<f32>, cycle_count: Option<u32>) {
        let mut cached = lock(&self.inner);
        if temperature_c.is_some() {
            cached.temperature_c = temperature_c;
        }
        if cycle_count.is_some() {
            cached.cycle_count = cycle_count;
        }
    }
}

/// Run `job` on a worker thread with a time budget. Returns the fresh
/// result if it arrives in time, otherwise `fallback`. The worker is
/// left to finish on its own.
pub fn with_timeout<T, F>(budget: Duration, fallback: Option<T>, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("battctl-slow-read".to_string())
        .spawn(move || {
            let _ = tx.send(job());
        });
    if spawned.is_err() {
        warn!("failed to spawn telemetry worker");
        return fallback;
    }
    match rx.recv_timeout(budget) {
        Ok(fresh) => fresh,
        Err(_) => {
            warn!("telemetry read exceeded {budget:?}; returning cached value");
            fallback
        }
    }
}

/// Assemble a [`BatteryStatus`] with the slow reads bounded by
/// `budget`. On timeout the cached temperature and cycle count stand
/// in; a fresh read always refreshes the cache.
pub fn gather_status<P>(
    control: &Arc<Mutex<BatteryControl<P>>>,
    cache: &TelemetryCache,
    budget: Duration,
) -> BatteryStatus
where
    P: SmcPort + Send + 'static,
{
    let mut status = lock(control).status_fast();

    let worker_control = Arc::clone(control);
    let fresh = with_timeout(budget, None, move || {
        let mut control = lock(&worker_control);
        Some((control.battery_temperature(), control.cycle_count()))
    });

    match fresh {
        Some((temperature_c, cycle_count)) => {
            cache.store(temperature_c, cycle_count);
            status.temperature_c = temperature_c;
            status.cycle_count = cycle_count;
        }
        None => {
            status.temperature_c = cache.temperature();
            status.cycle_count = cache.cycle_count();
        }
    }
    status
}

/// Lock that shrugs off poisoning: a panicked holder cannot corrupt
/// the plain-data state behind these mutexes.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
