use std::collections::HashSet;
use std::env;
use std::time::Duration;

const DEFAULT_STREAM_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";
const DEFAULT_ALERT_USER: &str = "ClueBot NG";
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 15;

// The upstream rejects requests without an identifying User-Agent (403).
const DEFAULT_USER_AGENT: &str = "wikiflow/0.1 (stream-monitoring; contact: ops@wikiflow.dev)";

/// Configuration loaded from environment variables
pub struct Config {
    pub stream_url: String,
    pub user_agent: String,
    pub watchlist: HashSet<String>,
    pub alert_user: String,
    pub metrics_path: String,
    pub alerts_path: String,
    pub state_path: String,
    pub flush_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every setting has a compiled default; the process runs with no flags.
    /// Set WATCHLIST (comma-separated page titles) to override the tracked set.
    pub fn from_env() -> Self {
        let stream_url = env::var("STREAM_URL").unwrap_or_else(|_| DEFAULT_STREAM_URL.to_string());
        let user_agent =
            env::var("STREAM_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        let alert_user = env::var("ALERT_USER").unwrap_or_else(|_| DEFAULT_ALERT_USER.to_string());

        let watchlist = env::var("WATCHLIST")
            .map(|s| {
                s.split(',')
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| Self::default_watchlist());

        let flush_interval = env::var("FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS));

        Self {
            stream_url,
            user_agent,
            watchlist,
            alert_user,
            metrics_path: env::var("METRICS_FILE")
                .unwrap_or_else(|_| "wiki_metrics.json".to_string()),
            alerts_path: env::var("ALERTS_FILE")
                .unwrap_or_else(|_| "wiki_alerts.log".to_string()),
            state_path: env::var("STATE_FILE")
                .unwrap_or_else(|_| "stream_state.json".to_string()),
            flush_interval,
        }
    }

    fn default_watchlist() -> HashSet<String> {
        [
            "The_Shawshank_Redemption",
            "The_Dark_Knight_(film)",
            "Tom_Hanks",
            "Christopher_Nolan",
            "Science_fiction_film",
        ]
        .iter()
        .map(|title| title.to_string())
        .collect()
    }
}
