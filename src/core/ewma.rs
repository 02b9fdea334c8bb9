//! Exponentially weighted moving average driven by a logical tick.
//!
//! The average is kept in fixed point with [`EWMA_SCALE`] fractional bits.
//! Every idle tick removes `ceil(avg / 2^EWMA_STABILITY_SHIFT)`, so a stale
//! rate always reaches zero instead of settling on a rounding floor.

use crate::clock::Tick;
use crate::config::{EWMA_SCALE, EWMA_STABILITY_SHIFT, EWMA_ZERO_HORIZON};

/// Weight of one unit of delta in the scaled average.
const DELTA_WEIGHT: u64 = 1 << (EWMA_SCALE - EWMA_STABILITY_SHIFT);

/// Smoothed rate of one traffic direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateEstimator {
    avg: u64,
    last: Tick,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decay for the ticks elapsed since the last update, then mix in `delta`.
    ///
    /// A `now` older than the last update is treated as no elapsed time.
    pub fn update(&mut self, now: Tick, delta: u64) {
        if now > self.last {
            self.decay(now - self.last);
            self.last = now;
        }
        if delta > 0 {
            self.avg = self.avg.saturating_add(delta.saturating_mul(DELTA_WEIGHT));
        }
    }

    /// Current smoothed value, in scaled units.
    pub fn average(&self) -> u64 {
        self.avg
    }

    /// Tick of the last update.
    pub fn last_update(&self) -> Tick {
        self.last
    }

    pub fn initialize(&mut self) {
        *self = Self::default();
    }

    fn decay(&mut self, periods: u64) {
        if periods >= EWMA_ZERO_HORIZON {
            self.avg = 0;
            return;
        }
        for _ in 0..periods {
            if self.avg == 0 {
                break;
            }
            self.avg -= self.avg.div_ceil(1 << EWMA_STABILITY_SHIFT);
        }
    }
}
