//! Centralized runtime constants and monitor configuration.
//!
//! All tunable sizes, decay constants, and limits are collected here so they
//! can be found and adjusted in a single place rather than scattered across
//! modules.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Number of slots per trie Node (one per byte value).
pub const FANOUT: usize = 256;

/// Key depth for IPv4 addresses (one trie level per octet).
pub const IPV4_DEPTH: usize = 4;

/// Fractional bits of the fixed-point rate average.
pub const EWMA_SCALE: u32 = 10;

/// Each idle tick removes `1 / 2^EWMA_STABILITY_SHIFT` of the average.
pub const EWMA_STABILITY_SHIFT: u32 = 4;

/// An idle gap this long (ticks) zeroes any average outright.
pub const EWMA_ZERO_HORIZON: u64 = 1024;

/// Logical clock resolution (ticks per second).
pub const TICKS_PER_SEC: u64 = 100;

/// Smallest non-zero memory maximum accepted from configuration (KiB).
pub const MEMMAX_MIN_KIB: u64 = 100;

/// Default interval of the periodic fold service (milliseconds).
pub const FOLD_INTERVAL_MS: u64 = 1000;

/// Whether an observation counts one packet or the packet's byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CountMode {
    #[default]
    #[serde(rename = "PACKETS")]
    Packets,
    #[serde(rename = "BYTES")]
    Bytes,
}

impl FromStr for CountMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PACKETS" => Ok(CountMode::Packets),
            "BYTES" => Ok(CountMode::Bytes),
            _ => Err(MonitorError::InvalidConfig(
                "monitor type should be \"PACKETS\" or \"BYTES\"".into(),
            )),
        }
    }
}

/// What happens when an observation pushes memory usage above the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Fold once at the configured threshold.
    Threshold,
    /// Fold at the threshold, then keep doubling it while still over the maximum.
    #[default]
    Escalating,
}

/// Monitor configuration as supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub mode: CountMode,
    /// Byte offset of the IPv4 header inside each packet.
    pub offset: usize,
    /// Fold threshold, in the scaled units reported by the rate averages.
    pub threshold: u64,
    /// Memory maximum in KiB, 0 = unlimited.
    pub memmax_kib: u64,
    /// Number of key bytes (trie levels) consumed per observation.
    pub depth: usize,
    pub policy: EvictionPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: CountMode::Packets,
            offset: 0,
            threshold: 1,
            memmax_kib: 0,
            depth: IPV4_DEPTH,
            policy: EvictionPolicy::Escalating,
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Memory maximum in bytes: 0 stays unlimited, anything else is clamped
    /// up to [`MEMMAX_MIN_KIB`].
    pub fn memmax_bytes(&self) -> usize {
        if self.memmax_kib == 0 {
            return 0;
        }
        let kib = self.memmax_kib.max(MEMMAX_MIN_KIB);
        usize::try_from(kib.saturating_mul(1024)).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(MonitorError::InvalidConfig(
                "depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
