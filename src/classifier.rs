use serde_json::Value;
use std::collections::HashSet;

/// Classification of a single parsed stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Synthetic canary traffic; excluded from every counter.
    Canary,
    /// Real traffic outside the watchlist; counted in the total only.
    Ignore,
    /// Edit on a watched page.
    Track(String),
    /// Edit on a watched page by the alert user.
    TrackAndAlert(String),
}

/// Classify one parsed event against the watchlist and the alert user.
///
/// Pure function: no I/O, no mutation. Counter updates happen in the
/// aggregator when the outcome is applied.
pub fn classify(event: &Value, watchlist: &HashSet<String>, alert_user: &str) -> Outcome {
    // Wikimedia injects canary events to verify stream liveness; they carry
    // real-looking titles and must never reach the counters.
    if event.pointer("/meta/domain").and_then(Value::as_str) == Some("canary") {
        return Outcome::Canary;
    }

    match event.get("title").and_then(Value::as_str) {
        Some(title) if watchlist.contains(title) => {
            if event.get("user").and_then(Value::as_str) == Some(alert_user) {
                Outcome::TrackAndAlert(title.to_string())
            } else {
                Outcome::Track(title.to_string())
            }
        }
        _ => Outcome::Ignore,
    }
}
