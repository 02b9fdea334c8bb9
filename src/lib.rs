//! Per-prefix traffic rate monitor.
//!
//! Packets are keyed by address bytes into a [`CounterTrie`] that keeps a
//! smoothed forward/reverse rate for every observed prefix. Memory is bounded
//! by folding: an oldest-first sweep that drops subtrees whose rates decayed
//! below a threshold.

pub mod capture;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod services;

pub use clock::{Clock, JiffyClock, ManualClock, Tick};
pub use config::{CountMode, EvictionPolicy, MonitorConfig};
pub use crate::core::{CounterRow, CounterTrie, Direction, RateEstimator};
pub use error::MonitorError;
pub use monitor::RateMonitor;
pub use services::FoldService;

/// Install the global `tracing` subscriber, filtered by `RUST_LOG`
/// (default `ipratemon=info`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipratemon=info".into()),
        )
        .try_init();
}
