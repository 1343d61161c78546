use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::algorithms::{Decision, WindowCounter};
use crate::clock::Clock;

/// Minimum time between two eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Owns one [`WindowCounter`] per client and evicts the idle ones.
///
/// Sweeps are opportunistic: they run inside [`LimiterRegistry::get_or_create`]
/// once the sweep interval has elapsed, not on a timer.
#[derive(Debug)]
pub struct LimiterRegistry {
    counters: RwLock<HashMap<String, Arc<WindowCounter>>>,
    created: Instant,
    // Milliseconds after `created` at which the last sweep started.
    last_sweep_ms: AtomicU64,
    capacity: u32,
    window: Duration,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    pub fn new(capacity: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            created: clock.now(),
            last_sweep_ms: AtomicU64::new(0),
            capacity,
            window,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            clock,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Return the counter for `client_id`, creating it on first sight.
    pub fn get_or_create(&self, client_id: &str) -> Arc<WindowCounter> {
        self.maybe_sweep();

        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(client_id) {
                return Arc::clone(counter);
            }
        }

        // Another request may have inserted it between the two locks.
        let mut counters = self.counters.write();
        let counter = counters.entry(client_id.to_string()).or_insert_with(|| {
            debug!(
                target: "starter_api::rate_limiter",
                client_id = %client_id,
                "Creating rate limiter for new client"
            );
            Arc::new(WindowCounter::new(
                self.capacity,
                self.window,
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(counter)
    }

    /// Run one admission check for `client_id` at `now`.
    pub fn check_at(&self, client_id: &str, now: Instant) -> Decision {
        self.get_or_create(client_id).allow_at(now)
    }

    /// Remove counters idle for longer than twice the window.
    ///
    /// Idleness is decided under each counter's read lock while the map is
    /// only read-locked; the map write lock is taken once for the removals.
    /// Returns the number of counters removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_after = self.window * 2;
        self.last_sweep_ms
            .store(self.millis_since_created(now), Ordering::Release);

        let candidates: Vec<String> = self
            .counters
            .read()
            .iter()
            .filter(|(_, counter)| counter.is_idle_at(now, idle_after))
            .map(|(client_id, _)| client_id.clone())
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        let mut counters = self.counters.write();
        let mut removed = 0;
        for client_id in candidates {
            // Skip counters an in-flight request still holds or used since the scan.
            let still_idle = counters.get(&client_id).is_some_and(|counter| {
                Arc::strong_count(counter) == 1 && counter.is_idle_at(now, idle_after)
            });
            if still_idle {
                counters.remove(&client_id);
                removed += 1;
            }
        }

        debug!(
            target: "starter_api::rate_limiter",
            removed,
            tracked = counters.len(),
            "Swept idle rate limiters"
        );
        removed
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_sweep(&self) {
        if self.claim_sweep(self.clock.now()) {
            self.sweep();
        }
    }

    // Lock-free: at most one caller wins the claim once the interval has passed.
    fn claim_sweep(&self, now: Instant) -> bool {
        let now_ms = self.millis_since_created(now);
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) <= self.sweep_interval.as_millis() as u64 {
            return false;
        }
        self.last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn millis_since_created(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.created).as_millis() as u64
    }
}
