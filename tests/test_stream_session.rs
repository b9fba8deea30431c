//! End-to-end session tests with a scripted subscription.
//!
//! The mock subscription replays a fixed sequence of stream items, letting the
//! tests drive the supervisor loop without a network connection and then
//! inspect the persisted artifacts.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use wikiflow::config::Config;
use wikiflow::error::SubscriptionError;
use wikiflow::persistence::StateStore;
use wikiflow::sse::{EventSubscription, StreamItem};
use wikiflow::supervisor::{LoopExit, Session};

/// Replays a scripted sequence, then reports the stream as closed.
struct ScriptedSubscription {
    items: VecDeque<Result<Option<StreamItem>, SubscriptionError>>,
}

impl ScriptedSubscription {
    fn new(items: Vec<Result<Option<StreamItem>, SubscriptionError>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

#[async_trait]
impl EventSubscription for ScriptedSubscription {
    async fn next_item(&mut self) -> Result<Option<StreamItem>, SubscriptionError> {
        self.items.pop_front().unwrap_or(Ok(None))
    }
}

fn message(data: &str, id: Option<&str>) -> Result<Option<StreamItem>, SubscriptionError> {
    Ok(Some(StreamItem {
        event_type: "message".to_string(),
        data: data.to_string(),
        id: id.map(String::from),
    }))
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    let watchlist: HashSet<String> = ["Tom_Hanks", "Christopher_Nolan"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Config {
        stream_url: "http://unused.invalid/stream".to_string(),
        user_agent: "wikiflow-test".to_string(),
        watchlist,
        alert_user: "ClueBot NG".to_string(),
        metrics_path: dir.path().join("metrics.json").display().to_string(),
        alerts_path: dir.path().join("alerts.log").display().to_string(),
        state_path: dir.path().join("state.json").display().to_string(),
        // Long enough that only the final flush persists anything.
        flush_interval: Duration::from_secs(3600),
    }
}

fn test_store(config: &Config) -> StateStore {
    StateStore::new(&config.metrics_path, &config.state_path, &config.alerts_path)
}

#[tokio::test]
async fn test_empty_stream_flushes_zero_counters() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![]);

    let exit = session.process_stream(&mut subscription).await.unwrap();
    assert_eq!(exit, LoopExit::Closed);
    session.final_flush();

    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 0);
    assert!(metrics.tracked_edits.values().all(|&c| c == 0));
    assert!(!std::path::Path::new(&config.alerts_path).exists());
}

#[tokio::test]
async fn test_single_tracked_edit_counts_without_alert() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![message(
        r#"{"title": "Tom_Hanks", "user": "Alice", "type": "edit"}"#,
        Some("tok-1"),
    )]);

    session.process_stream(&mut subscription).await.unwrap();
    session.final_flush();

    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 1);
    assert_eq!(metrics.tracked_edits["Tom_Hanks"], 1);
    assert!(!std::path::Path::new(&config.alerts_path).exists());
    assert_eq!(store.load_position().unwrap().unwrap(), "tok-1");
}

#[tokio::test]
async fn test_alert_user_edit_writes_exactly_one_alert() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![message(
        r#"{"title": "Tom_Hanks", "user": "ClueBot NG", "type": "edit"}"#,
        Some("tok-1"),
    )]);

    session.process_stream(&mut subscription).await.unwrap();
    session.final_flush();

    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 1);
    assert_eq!(metrics.tracked_edits["Tom_Hanks"], 1);

    let log = std::fs::read_to_string(&config.alerts_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["title"], "Tom_Hanks");
    assert_eq!(record["user"], "ClueBot NG");
}

#[tokio::test]
async fn test_canary_event_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![message(
        r#"{"title": "Tom_Hanks", "user": "Alice", "meta": {"domain": "canary"}}"#,
        Some("tok-1"),
    )]);

    session.process_stream(&mut subscription).await.unwrap();
    session.final_flush();

    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 0);
    assert_eq!(metrics.tracked_edits["Tom_Hanks"], 0);
    // The canary item was still acknowledged, so its position persists.
    assert_eq!(store.load_position().unwrap().unwrap(), "tok-1");
}

#[tokio::test]
async fn test_malformed_payload_is_dropped_but_position_advances() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![
        message("{not valid json", Some("tok-1")),
        message(
            r#"{"title": "Christopher_Nolan", "user": "Alice", "type": "edit"}"#,
            Some("tok-2"),
        ),
    ]);

    session.process_stream(&mut subscription).await.unwrap();
    session.final_flush();

    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 1);
    assert_eq!(metrics.tracked_edits["Christopher_Nolan"], 1);
    assert_eq!(store.load_position().unwrap().unwrap(), "tok-2");
}

#[tokio::test]
async fn test_control_items_are_skipped_but_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![Ok(Some(StreamItem {
        event_type: "error".to_string(),
        data: "upstream hiccup".to_string(),
        id: Some("tok-9".to_string()),
    }))]);

    session.process_stream(&mut subscription).await.unwrap();

    assert_eq!(session.metrics().total_events_processed, 0);
    assert_eq!(session.position(), Some("tok-9"));
}

#[tokio::test]
async fn test_item_without_token_keeps_previous_position() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![
        message(r#"{"title": "Other"}"#, Some("tok-1")),
        message(r#"{"title": "Other"}"#, None),
    ]);

    session.process_stream(&mut subscription).await.unwrap();

    assert_eq!(session.metrics().total_events_processed, 2);
    assert_eq!(session.position(), Some("tok-1"));
}

#[tokio::test]
async fn test_stop_before_processing_interrupts_and_flushes_zeros() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    // Signal raised before the loop ever polls for it; it must still be
    // observed, and pending items must stay unprocessed.
    session.stop_signal().trigger();

    let mut subscription = ScriptedSubscription::new(vec![message(
        r#"{"title": "Tom_Hanks", "user": "Alice", "type": "edit"}"#,
        Some("tok-1"),
    )]);
    let exit = session.process_stream(&mut subscription).await.unwrap();
    assert_eq!(exit, LoopExit::Interrupted);

    session.final_flush();
    let metrics = store.load_metrics().unwrap().unwrap();
    assert_eq!(metrics.total_events_processed, 0);
    assert!(metrics.tracked_edits.values().all(|&c| c == 0));
}

/// Replays a script, then waits forever, like a quiet live stream.
struct IdleAfterScript {
    items: VecDeque<Result<Option<StreamItem>, SubscriptionError>>,
}

#[async_trait]
impl EventSubscription for IdleAfterScript {
    async fn next_item(&mut self) -> Result<Option<StreamItem>, SubscriptionError> {
        match self.items.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn test_stop_during_idle_wait_exits_after_in_flight_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let stop = session.stop_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.trigger();
    });

    let mut subscription = IdleAfterScript {
        items: vec![message(
            r#"{"title": "Tom_Hanks", "user": "Alice", "type": "edit"}"#,
            Some("tok-1"),
        )]
        .into(),
    };

    let exit = session.process_stream(&mut subscription).await.unwrap();
    assert_eq!(exit, LoopExit::Interrupted);
    // The item pulled before the signal was fully processed, not abandoned.
    assert_eq!(session.metrics().total_events_processed, 1);
    assert_eq!(session.position(), Some("tok-1"));
}

#[tokio::test]
async fn test_read_error_propagates_to_caller() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = test_store(&config);

    let mut session = Session::start(&config, &store);
    let mut subscription = ScriptedSubscription::new(vec![
        message(r#"{"title": "Tom_Hanks", "user": "Alice"}"#, Some("tok-1")),
        Err(SubscriptionError::Read("connection reset".to_string())),
    ]);

    let err = session.process_stream(&mut subscription).await.unwrap_err();
    assert!(matches!(err, SubscriptionError::Read(_)));

    // State processed before the failure is intact for the final flush.
    assert_eq!(session.metrics().total_events_processed, 1);
    assert_eq!(session.position(), Some("tok-1"));
}
