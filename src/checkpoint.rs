use {
    crate::aggregator::Metrics,
    crate::persistence::StateStore,
    std::time::{Duration, Instant},
};

/// Drives periodic persistence of the counters and the stream position.
///
/// The check runs after each processed item, so the cadence is wall-clock
/// based rather than event-count based: bursts cannot cause extra flushes and
/// a trickle cannot starve them. On a fully idle stream the flush waits for
/// the next item; the final flush on shutdown covers that window.
pub struct CheckpointScheduler {
    interval: Duration,
    last_flush: Instant,
}

impl CheckpointScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_flush: Instant::now(),
        }
    }

    /// Flush if the interval has elapsed since the last flush.
    ///
    /// The timer resets whether or not the writes succeed, so a broken sink
    /// is retried once per interval instead of once per event. Returns true
    /// when a flush was attempted.
    pub fn tick(&mut self, metrics: &Metrics, position: Option<&str>, store: &StateStore) -> bool {
        if self.last_flush.elapsed() < self.interval {
            return false;
        }
        Self::flush(metrics, position, store);
        self.last_flush = Instant::now();
        true
    }

    /// Snapshot the counters, then the position, in that order.
    ///
    /// Metrics-before-position means a crash between the two writes leaves
    /// the persisted position behind the persisted counters; resuming then
    /// re-counts a few events (at-least-once) instead of silently skipping
    /// them.
    pub fn flush(metrics: &Metrics, position: Option<&str>, store: &StateStore) {
        match store.save_metrics(metrics) {
            Ok(()) => {
                log::info!(
                    "Metrics saved at {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                );
            }
            Err(e) => log::error!("Failed to save metrics: {}", e),
        }

        if let Some(token) = position {
            if let Err(e) = store.save_position(token) {
                log::error!("Failed to save stream position: {}", e);
            }
        }
    }
}
