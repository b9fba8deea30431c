use {
    crate::aggregator::{Aggregator, Metrics},
    crate::backoff::ExponentialBackoff,
    crate::checkpoint::CheckpointScheduler,
    crate::classifier,
    crate::config::Config,
    crate::error::{SessionError, SubscriptionError},
    crate::persistence::StateStore,
    crate::sse::{EventSubscription, SseSubscription, StreamItem},
    serde_json::Value,
    std::sync::Arc,
    std::time::Duration,
    tokio::sync::watch,
};

const BACKOFF_INITIAL: Duration = Duration::from_secs(5);
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const BACKOFF_ATTEMPTS: u32 = 10;

/// Latching stop flag shared across every await point in the session.
///
/// Backed by a watch channel, so a trigger that fires while nothing is
/// waiting is still observed by the next `wait` call.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::channel(false).0),
        }
    }

    /// Forward ctrl-c to this signal.
    ///
    /// The process-level handler is installed immediately, before any
    /// connect attempt, so an early or between-polls signal is latched
    /// instead of hitting the default disposition.
    pub fn listen_for_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Stream stopped by user");
                signal.trigger();
            }
        });
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once the signal has been triggered, including when the
    /// trigger happened before this call.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a per-connection processing loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// External stop signal observed after finishing the in-flight item.
    Interrupted,
    /// Server closed the stream cleanly.
    Closed,
}

/// One processing session: owns the counters, the locally tracked stream
/// position, the checkpoint scheduler, and the reconnect policy.
///
/// Everything runs on the caller's task; components are invoked
/// synchronously per item, so no state is shared and nothing locks.
pub struct Session<'a> {
    config: &'a Config,
    store: &'a StateStore,
    aggregator: Aggregator,
    scheduler: CheckpointScheduler,
    position: Option<String>,
    stop: StopSignal,
}

impl<'a> Session<'a> {
    /// Restore persisted state and log the resume point.
    pub fn start(config: &'a Config, store: &'a StateStore) -> Self {
        let previous = match store.load_metrics() {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Could not read previous metrics, starting fresh: {}", e);
                None
            }
        };
        let metrics = Metrics::restore(previous, &config.watchlist);

        let position = match store.load_position() {
            Ok(position) => position,
            Err(e) => {
                log::warn!("Could not read stream position, starting fresh: {}", e);
                None
            }
        };

        match &position {
            Some(token) => log::info!("Resuming from last event ID: {}", token),
            None => log::info!("No saved position, starting from live head"),
        }
        log::info!("Tracking {} entities", config.watchlist.len());
        log::info!("Alerting on edits by user '{}'", config.alert_user);

        let stop = StopSignal::new();
        stop.listen_for_ctrl_c();

        Self {
            config,
            store,
            aggregator: Aggregator::new(metrics),
            scheduler: CheckpointScheduler::new(config.flush_interval),
            position,
            stop,
        }
    }

    /// Handle for requesting shutdown from outside the loop.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn metrics(&self) -> &Metrics {
        self.aggregator.metrics()
    }

    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    /// Run the session to completion: connect, process, reconnect with
    /// backoff on failure, and flush unconditionally on the way out.
    ///
    /// Ok means clean interruption; Err means the transport gave up. The
    /// final flush runs on both paths, and a failure there is logged without
    /// changing the already-determined outcome.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let result = self.run_connect_loop().await;

        log::info!("Saving final state...");
        if let Some(token) = self.position.as_deref() {
            log::info!("Final stream position: {}", token);
        }
        self.final_flush();
        log::info!("Exiting.");

        result
    }

    async fn run_connect_loop(&mut self) -> Result<(), SessionError> {
        let mut backoff = ExponentialBackoff::new(BACKOFF_INITIAL, BACKOFF_MAX, BACKOFF_ATTEMPTS);
        let mut last_error: Option<SubscriptionError> = None;
        let stop = self.stop.clone();

        loop {
            log::info!("Connecting to event stream: {}", self.config.stream_url);
            // The connect attempt is an await point too; the stop signal must
            // win it, or a shutdown during a slow connect would hang.
            let opened = tokio::select! {
                biased;
                _ = stop.wait() => {
                    log::info!("Stop signal observed during connect");
                    return Ok(());
                }
                opened = SseSubscription::open(
                    &self.config.stream_url,
                    &self.config.user_agent,
                    self.position.as_deref(),
                ) => opened,
            };
            match opened {
                Ok(mut subscription) => {
                    log::info!("Connected");
                    backoff.reset();
                    last_error = None;

                    match self.process_stream(&mut subscription).await {
                        Ok(LoopExit::Interrupted) => return Ok(()),
                        Ok(LoopExit::Closed) => {
                            log::warn!("Server closed the stream");
                        }
                        Err(e) => {
                            log::error!("Stream read failed: {}", e);
                            last_error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Connection failed: {}", e);
                    last_error = Some(e);
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    // Stay interruptible while waiting to reconnect.
                    tokio::select! {
                        biased;
                        _ = stop.wait() => {
                            log::info!("Stop signal observed during reconnect wait");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    return Err(match last_error.take() {
                        Some(e) => SessionError::Transport(e),
                        None => SessionError::MaxRetries,
                    });
                }
            }
        }
    }

    /// Pull items from one open subscription until interruption, stream
    /// close, or a read error.
    ///
    /// The stop signal is latched, so one raised while an item is being
    /// handled is observed on the next pull; the in-flight event always
    /// completes before shutdown.
    pub async fn process_stream(
        &mut self,
        subscription: &mut dyn EventSubscription,
    ) -> Result<LoopExit, SubscriptionError> {
        let stop = self.stop.clone();
        loop {
            tokio::select! {
                biased;
                _ = stop.wait() => {
                    log::info!("Stop signal observed, shutting down");
                    return Ok(LoopExit::Interrupted);
                }
                item = subscription.next_item() => match item? {
                    Some(item) => self.handle_item(item),
                    None => return Ok(LoopExit::Closed),
                },
            }
        }
    }

    fn handle_item(&mut self, item: StreamItem) {
        // Position advances on every acknowledged item, including ones that
        // are skipped or ignored below. It is never cleared or regressed.
        if let Some(id) = item.id {
            self.position = Some(id);
        }

        if item.event_type != "message" {
            return;
        }

        let event: Value = match serde_json::from_str(&item.data) {
            Ok(event) => event,
            Err(_) => {
                log::warn!("Received a malformed event payload, skipping");
                return;
            }
        };

        let outcome = classifier::classify(&event, &self.config.watchlist, &self.config.alert_user);
        self.aggregator.apply(&outcome, &event, self.store);
        self.scheduler
            .tick(self.aggregator.metrics(), self.position.as_deref(), self.store);
    }

    /// Best-effort flush of counters and position, safe to call at any time.
    pub fn final_flush(&self) {
        CheckpointScheduler::flush(self.aggregator.metrics(), self.position.as_deref(), self.store);
    }
}
