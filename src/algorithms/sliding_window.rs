//! Sliding window rate limiting algorithm
//!
//! Implements a sliding window log for a single client. Every admitted
//! request leaves a timestamp behind; a request is admitted while fewer than
//! `capacity` timestamps fall inside the trailing window.

use crate::clock::Clock;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

impl Decision {
    pub fn allowed(remaining: u32, reset_at: Instant) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
        }
    }

    pub fn denied(reset_at: Instant) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
        }
    }
}

/// Admission timestamps for one client inside a trailing window.
#[derive(Debug)]
pub struct WindowCounter {
    // Oldest first.
    timestamps: RwLock<VecDeque<Instant>>,
    capacity: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl WindowCounter {
    /// Create a new, empty counter
    pub fn new(capacity: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            timestamps: RwLock::new(VecDeque::with_capacity(capacity.min(1024) as usize)),
            capacity,
            window,
            clock,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to admit one request now.
    pub fn allow(&self) -> Decision {
        self.allow_at(self.clock.now())
    }

    /// Try to admit one request at `now`.
    ///
    /// The whole prune, count and append sequence runs under the write lock,
    /// so decisions for one client are serialized.
    pub fn allow_at(&self, now: Instant) -> Decision {
        let mut timestamps = self.timestamps.write();
        self.prune(&mut timestamps, now);

        let used = timestamps.len();
        if used < self.capacity as usize {
            timestamps.push_back(now);
            let remaining = self.capacity - used as u32 - 1;
            return Decision::allowed(remaining, now + self.window);
        }

        let reset_at = timestamps
            .front()
            .map(|oldest| *oldest + self.window)
            .unwrap_or(now + self.window);
        Decision::denied(reset_at.max(now))
    }

    /// Quota left at `now` without consuming any of it.
    pub fn remaining_at(&self, now: Instant) -> u32 {
        let timestamps = self.timestamps.read();
        let in_window = timestamps
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count();
        self.capacity.saturating_sub(in_window as u32)
    }

    /// Whether nothing was admitted within `idle_after` of `now`.
    pub fn is_idle_at(&self, now: Instant, idle_after: Duration) -> bool {
        let timestamps = self.timestamps.read();
        match timestamps.back() {
            None => true,
            Some(latest) => now.saturating_duration_since(*latest) > idle_after,
        }
    }

    /// Number of timestamps currently held, including any not yet pruned.
    pub fn len(&self) -> usize {
        self.timestamps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Timestamps are ordered, so expired entries always form a prefix.
    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) < self.window {
                break;
            }
            timestamps.pop_front();
        }
    }
}
