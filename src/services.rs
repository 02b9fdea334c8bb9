//! Background service lifecycle management.
//!
//! `FoldService` runs the eviction sweep on a fixed interval so stale
//! prefixes are released even when no memory maximum is configured.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::clock::Clock;
use crate::config::FOLD_INTERVAL_MS;
use crate::monitor::RateMonitor;

/// Periodic fold task. Stops when dropped.
pub struct FoldService {
    handle: tokio::task::JoinHandle<()>,
}

impl FoldService {
    /// Spawn the fold loop on the current tokio runtime.
    pub fn spawn<C>(monitor: Arc<Mutex<RateMonitor>>, clock: Arc<C>, interval: Duration) -> Result<Self>
    where
        C: Clock + 'static,
    {
        ensure!(!interval.is_zero(), "fold interval must be non-zero");
        let runtime =
            tokio::runtime::Handle::try_current().context("fold service needs a tokio runtime")?;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = clock.now();
                let evicted = match monitor.lock() {
                    Ok(mut m) => m.fold(now),
                    Err(poisoned) => {
                        tracing::warn!("Rate monitor lock poisoned, folding anyway");
                        poisoned.into_inner().fold(now)
                    }
                };
                if evicted > 0 {
                    tracing::debug!(now, evicted, "Periodic fold evicted nodes");
                }
            }
        });

        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(interval_ms, "Fold service started");
        Ok(Self { handle })
    }

    /// Spawn the fold loop with the default [`FOLD_INTERVAL_MS`] interval.
    pub fn spawn_default<C>(monitor: Arc<Mutex<RateMonitor>>, clock: Arc<C>) -> Result<Self>
    where
        C: Clock + 'static,
    {
        Self::spawn(monitor, clock, Duration::from_millis(FOLD_INTERVAL_MS))
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for FoldService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MonitorConfig;
    use crate::core::trie::Direction;

    fn shared_monitor() -> Arc<Mutex<RateMonitor>> {
        let mut m = RateMonitor::new(&MonitorConfig::default(), 0).unwrap();
        m.observe(&[10, 0, 0, 1], Direction::Forward, 1, 0).unwrap();
        Arc::new(Mutex::new(m))
    }

    /// Move paused tokio time forward and let the fold task run.
    async fn run_for(duration: Duration) {
        tokio::time::advance(duration).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fold_evicts_stale_nodes() {
        let monitor = shared_monitor();
        let clock = Arc::new(ManualClock::new(0));
        let service =
            FoldService::spawn(Arc::clone(&monitor), Arc::clone(&clock), Duration::from_millis(5))
                .unwrap();

        run_for(Duration::from_millis(30)).await;
        assert_eq!(monitor.lock().unwrap().trie().node_count(), 4, "rates still fresh");

        clock.advance(1000);
        run_for(Duration::from_millis(5)).await;
        assert_eq!(monitor.lock().unwrap().trie().node_count(), 1);
        assert!(service.is_running());

        service.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_interval_folds_once_per_period() {
        let monitor = shared_monitor();
        let clock = Arc::new(ManualClock::new(0));
        let _service = FoldService::spawn_default(Arc::clone(&monitor), Arc::clone(&clock)).unwrap();

        run_for(Duration::ZERO).await;
        clock.advance(1000);
        run_for(Duration::from_millis(FOLD_INTERVAL_MS - 1)).await;
        assert_eq!(monitor.lock().unwrap().trie().node_count(), 4, "next tick not due yet");

        run_for(Duration::from_millis(1)).await;
        assert_eq!(monitor.lock().unwrap().trie().node_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let err = FoldService::spawn(shared_monitor(), Arc::new(ManualClock::new(0)), Duration::ZERO)
            .err()
            .unwrap();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = FoldService::spawn(
            shared_monitor(),
            Arc::new(ManualClock::new(0)),
            Duration::from_millis(5),
        );
        assert!(result.is_err());
    }
}
