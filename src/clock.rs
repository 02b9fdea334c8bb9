//! Logical clock sources.
//!
//! Rates decay per tick, so everything in the monitor takes an explicit
//! [`Tick`]. Hosts obtain it from a [`Clock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::TICKS_PER_SEC;

/// Monotonically increasing logical time unit.
pub type Tick = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Wall clock quantized to [`TICKS_PER_SEC`] ticks per second since creation.
#[derive(Debug, Clone, Copy)]
pub struct JiffyClock {
    origin: Instant,
}

impl JiffyClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for JiffyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for JiffyClock {
    fn now(&self) -> Tick {
        let elapsed = self.origin.elapsed();
        elapsed.as_secs() * TICKS_PER_SEC
            + u64::from(elapsed.subsec_millis()) * TICKS_PER_SEC / 1000
    }
}

/// Caller-driven clock, for replaying captures and for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Tick) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, ticks: Tick) {
        self.now.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Moves the clock to `tick`; never moves it backwards.
    pub fn set(&self, tick: Tick) {
        self.now.fetch_max(tick, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::Relaxed)
    }
}
