use {
    crate::classifier::Outcome,
    crate::persistence::StateStore,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::collections::{BTreeMap, HashSet},
};

/// Snapshot of the aggregate counters, persisted as the metrics slot.
///
/// `tracked_edits` always holds exactly the watchlist titles; keys are
/// initialized to 0 at startup and never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub total_events_processed: u64,
    pub tracked_edits: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new(watchlist: &HashSet<String>) -> Self {
        Self {
            total_events_processed: 0,
            tracked_edits: watchlist.iter().map(|title| (title.clone(), 0)).collect(),
        }
    }

    /// Rebuild counters from a previous snapshot, if any.
    ///
    /// Only counters for titles still on the watchlist survive a restore, so
    /// the key set stays closed over the configured watchlist even if the
    /// snapshot was written under a different configuration.
    pub fn restore(previous: Option<Metrics>, watchlist: &HashSet<String>) -> Self {
        let mut metrics = Self::new(watchlist);
        if let Some(previous) = previous {
            metrics.total_events_processed = previous.total_events_processed;
            for (title, count) in previous.tracked_edits {
                if let Some(slot) = metrics.tracked_edits.get_mut(&title) {
                    *slot = count;
                }
            }
        }
        metrics
    }
}

/// Owns the in-memory counters and the alert decision.
///
/// Single-owner: the supervisor holds the only handle, so no locking is
/// needed anywhere in the hot path.
pub struct Aggregator {
    metrics: Metrics,
}

impl Aggregator {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Apply one classified event to the counters.
    ///
    /// Alert writes are fire-and-forget from here: a failed append is logged
    /// and processing continues.
    pub fn apply(&mut self, outcome: &Outcome, event: &Value, store: &StateStore) {
        match outcome {
            Outcome::Canary => {}
            Outcome::Ignore => {
                self.metrics.total_events_processed += 1;
            }
            Outcome::Track(title) => {
                self.metrics.total_events_processed += 1;
                self.record_tracked(title, event);
            }
            Outcome::TrackAndAlert(title) => {
                self.metrics.total_events_processed += 1;
                self.record_tracked(title, event);

                let user = event.get("user").and_then(Value::as_str).unwrap_or("N/A");
                log::info!("*** ALERT: user '{}' edited '{}' ***", user, title);
                if let Err(e) = store.append_alert(event) {
                    log::warn!("Failed to write alert record: {}", e);
                }
            }
        }
    }

    fn record_tracked(&mut self, title: &str, event: &Value) {
        if let Some(count) = self.metrics.tracked_edits.get_mut(title) {
            *count += 1;
        }

        let user = event.get("user").and_then(Value::as_str).unwrap_or("N/A");
        let edit_type = event.get("type").and_then(Value::as_str).unwrap_or("N/A");
        log::info!(
            "Tracked edit on '{}' by '{}' (type: {})",
            title,
            user,
            edit_type
        );
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
