//! The rate monitor: a counter trie plus its configuration and control surface.
//!
//! One `RateMonitor` expects exclusive access. Hosts that observe from several
//! threads wrap it in a mutex or keep one monitor per worker.

use crate::capture::parse_ipv4_sample;
use crate::clock::Tick;
use crate::config::{CountMode, EvictionPolicy, MonitorConfig};
use crate::core::report::{self, CounterRow};
use crate::core::trie::{CounterTrie, Direction};
use crate::error::{MonitorError, Result};

/// Counter trie plus threshold, memory maximum and reset base.
pub struct RateMonitor {
    trie: CounterTrie,
    mode: CountMode,
    offset: usize,
    threshold: u64,
    /// Bytes, 0 = unlimited.
    memmax: usize,
    policy: EvictionPolicy,
    reset_time: Tick,
}

impl RateMonitor {
    /// Validate `config` and create an empty monitor whose elapsed base is `now`.
    pub fn new(config: &MonitorConfig, now: Tick) -> Result<Self> {
        config.validate()?;
        let trie = CounterTrie::new(config.depth)?;
        let monitor = Self {
            trie,
            mode: config.mode,
            offset: config.offset,
            threshold: config.threshold,
            memmax: config.memmax_bytes(),
            policy: config.policy,
            reset_time: now,
        };
        tracing::info!(
            mode = ?monitor.mode,
            depth = config.depth,
            threshold = monitor.threshold,
            memmax = monitor.memmax,
            "Rate monitor initialized"
        );
        Ok(monitor)
    }

    /// Record one observation, then evict if memory is over the maximum.
    ///
    /// The check runs after the insertion, so the current observation is
    /// always admitted.
    pub fn observe(
        &mut self,
        key: &[u8],
        direction: Direction,
        amount: u64,
        now: Tick,
    ) -> Result<()> {
        self.trie.observe(key, direction, amount, now)?;
        if self.memmax > 0 && self.trie.memory_usage() > self.memmax {
            self.relieve_pressure(now);
        }
        Ok(())
    }

    /// Extract the address key from an IPv4 packet and observe it.
    ///
    /// Returns `false` when the packet carries no usable IPv4 header.
    pub fn observe_packet(&mut self, data: &[u8], direction: Direction, now: Tick) -> Result<bool> {
        let Some(sample) = parse_ipv4_sample(data, self.offset, direction, self.mode) else {
            return Ok(false);
        };
        self.observe(&sample.key, direction, sample.amount, now)?;
        Ok(true)
    }

    /// Fold at the configured threshold.
    pub fn fold(&mut self, now: Tick) -> usize {
        self.trie.fold(self.threshold, now)
    }

    fn relieve_pressure(&mut self, now: Tick) {
        let mut threshold = self.threshold;
        let mut evicted = self.trie.fold(threshold, now);

        if self.policy == EvictionPolicy::Escalating {
            while self.trie.memory_usage() > self.memmax
                && self.trie.node_count() > 1
                && threshold < u64::MAX
            {
                threshold = threshold.max(1).saturating_mul(2);
                evicted += self.trie.fold(threshold, now);
            }
        }

        let mem = self.trie.memory_usage();
        if mem > self.memmax {
            tracing::warn!(mem, memmax = self.memmax, evicted, "Memory still above maximum after fold");
        } else {
            tracing::debug!(mem, memmax = self.memmax, evicted, threshold, "Memory pressure relieved");
        }
    }

    /// Fold threshold, in scaled rate units.
    pub fn thresh(&self) -> u64 {
        self.threshold
    }

    /// Bytes currently accounted to the trie.
    pub fn mem(&self) -> usize {
        self.trie.memory_usage()
    }

    /// Memory maximum in bytes, 0 = unlimited.
    pub fn memmax(&self) -> usize {
        self.memmax
    }

    /// Takes effect at the next observation's memory check.
    pub fn set_memmax(&mut self, bytes: usize) {
        tracing::info!(old = self.memmax, new = bytes, "Memory maximum changed");
        self.memmax = bytes;
    }

    /// Parse a memory maximum command argument and apply it.
    ///
    /// Expects exactly one non-negative integer (bytes).
    pub fn set_memmax_from_str(&mut self, arg: &str) -> Result<()> {
        let mut args = arg.split_whitespace();
        let (Some(value), None) = (args.next(), args.next()) else {
            return Err(MonitorError::InvalidInput("expecting 1 integer".into()));
        };
        let bytes = value
            .parse::<usize>()
            .map_err(|_| MonitorError::InvalidInput(format!("not an integer: {value}")))?;
        self.set_memmax(bytes);
        Ok(())
    }

    /// Whether observations count packets or bytes.
    pub fn mode(&self) -> CountMode {
        self.mode
    }

    /// Ticks since construction or the last reset.
    pub fn elapsed(&self, now: Tick) -> Tick {
        now.saturating_sub(self.reset_time)
    }

    /// Active prefixes with their rates decayed to `now`.
    pub fn snapshot(&mut self, now: Tick) -> Vec<CounterRow> {
        self.trie.snapshot(now)
    }

    /// Elapsed ticks on the first line, then the rendered dump.
    pub fn look(&mut self, now: Tick) -> String {
        let rows = self.trie.snapshot(now);
        format!("{}\n{}", self.elapsed(now), report::render(&rows))
    }

    /// The dump rows as a JSON array.
    pub fn look_json(&mut self, now: Tick) -> Result<String> {
        let rows = self.trie.snapshot(now);
        report::render_json(&rows)
    }

    /// Clear every rate and restart the elapsed-time base.
    pub fn reset(&mut self, now: Tick) {
        self.trie.clear();
        self.reset_time = now;
        tracing::info!(mem = self.trie.memory_usage(), "Rate monitor reset");
    }

    /// Read-only access to the underlying counter trie.
    pub fn trie(&self) -> &CounterTrie {
        &self.trie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trie::{COUNTER_BYTES, NODE_BYTES};

    fn monitor() -> RateMonitor {
        RateMonitor::new(&MonitorConfig::default(), 0).unwrap()
    }

    fn ipv4(src: [u8; 4], dst: [u8; 4], total_length: u16) -> Vec<u8> {
        let mut pkt = vec![0u8; 20];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&total_length.to_be_bytes());
        pkt[12..16].copy_from_slice(&src);
        pkt[16..20].copy_from_slice(&dst);
        pkt
    }

    #[test]
    fn test_look_shows_both_directions() {
        let mut m = monitor();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        m.observe(&[10, 0, 0, 1], Direction::Reverse, 1, 0).unwrap();
        let text = m.look(0);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0"));
        assert_eq!(lines.next(), Some("10\t64\t64"));
        assert!(text.contains("\t\t\t10.0.0.1\t64\t64\n"));
    }

    #[test]
    fn test_look_reports_elapsed_since_reset() {
        let mut m = monitor();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 5).unwrap();
        assert!(m.look(30).starts_with("30\n"));
        m.reset(30);
        assert_eq!(m.look(42), "12\n");
    }

    #[test]
    fn test_stale_subtree_is_folded_back_to_baseline() {
        let mut m = monitor();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        assert_eq!(m.fold(1000), 3);
        assert_eq!(m.mem(), NODE_BYTES + COUNTER_BYTES);
        assert_eq!(m.trie().node_count(), 1);
    }

    #[test]
    fn test_reset_keeps_top_level_only() {
        let mut m = monitor();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        m.reset(1);
        assert_eq!(m.mem(), NODE_BYTES + COUNTER_BYTES);
        assert!(m.snapshot(1).is_empty());
    }

    #[test]
    fn test_memory_stays_bounded_under_pressure() {
        let mut m = monitor();
        let memmax = NODE_BYTES * 12;
        m.set_memmax(memmax);
        let one_insertion = 3 * NODE_BYTES + 4 * COUNTER_BYTES;
        for i in 0u32..2000 {
            let key = [(i % 4) as u8, (i / 4 % 256) as u8, (i / 1024) as u8, 1];
            m.observe(&key, Direction::Forward, 1, 0).unwrap();
            assert!(m.mem() <= memmax + one_insertion, "mem {} at {i}", m.mem());
            m.trie().audit();
        }
    }

    #[test]
    fn test_threshold_policy_only_evicts_stale_nodes() {
        let config = MonitorConfig {
            policy: EvictionPolicy::Threshold,
            ..MonitorConfig::default()
        };
        let mut m = RateMonitor::new(&config, 0).unwrap();
        m.set_memmax(NODE_BYTES * 5);
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        m.observe(&[20, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        assert_eq!(m.trie().node_count(), 7, "nothing is stale yet");

        m.observe(&[30, 0, 0, 1], Direction::Forward, 1, 1000).unwrap();
        assert_eq!(m.trie().node_count(), 4);
        assert!(m.trie().lookup(&[30, 0, 0, 1]).is_some());
    }

    #[test]
    fn test_unlimited_memmax_never_folds() {
        let mut m = monitor();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        m.observe(&[20, 0, 0, 1], Direction::Forward, 1, 5000).unwrap();
        assert_eq!(m.trie().node_count(), 7);
    }

    #[test]
    fn test_observe_packet_uses_mode_and_offset() {
        let config = MonitorConfig {
            mode: CountMode::Bytes,
            offset: 4,
            ..MonitorConfig::default()
        };
        let mut m = RateMonitor::new(&config, 0).unwrap();
        let mut frame = vec![0u8; 4];
        frame.extend(ipv4([10, 0, 0, 1], [10, 0, 0, 2], 100));

        assert!(m.observe_packet(&frame, Direction::Forward, 0).unwrap());
        assert!(m.observe_packet(&frame, Direction::Reverse, 0).unwrap());
        assert_eq!(m.trie().lookup(&[10, 0, 0, 1]).unwrap().fwd.average(), 100 * 64);
        assert_eq!(m.trie().lookup(&[10, 0, 0, 2]).unwrap().rev.average(), 100 * 64);
        assert!(!m.observe_packet(&[1, 2, 3], Direction::Forward, 0).unwrap());
    }

    #[test]
    fn test_queries() {
        let config = MonitorConfig {
            threshold: 32,
            memmax_kib: 200,
            ..MonitorConfig::default()
        };
        let m = RateMonitor::new(&config, 0).unwrap();
        assert_eq!(m.thresh(), 32);
        assert_eq!(m.memmax(), 200 * 1024);
        assert_eq!(m.mem(), NODE_BYTES);
        assert_eq!(m.mode(), CountMode::Packets);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MonitorConfig {
            depth: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(RateMonitor::new(&config, 0).err().unwrap().kind(), "InvalidConfig");
    }

    #[test]
    fn test_set_memmax_from_str() {
        let mut m = monitor();
        m.set_memmax_from_str(" 65536\n").unwrap();
        assert_eq!(m.memmax(), 65536);
    }

    #[test]
    fn test_set_memmax_from_str_rejects_bad_input() {
        let mut m = monitor();
        let err = m.set_memmax_from_str("lots").unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        assert!(err.to_string().starts_with("not an integer"));

        let err = m.set_memmax_from_str("1 2").unwrap_err();
        assert_eq!(err.to_string(), "expecting 1 integer");
        let err = m.set_memmax_from_str("").unwrap_err();
        assert_eq!(err.to_string(), "expecting 1 integer");
        assert_eq!(m.memmax(), 0, "failed commands leave the maximum alone");
    }

    #[test]
    fn test_look_json() {
        let mut m = monitor();
        m.observe(&[10], Direction::Forward, 1, 0).unwrap();
        let json = m.look_json(0).unwrap();
        assert_eq!(json, r#"[{"prefix":"10","depth":0,"fwd":64,"rev":0}]"#);
    }
}
