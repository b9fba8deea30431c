use {
    crate::aggregator::Metrics,
    crate::error::StoreError,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::{
        fs::{self, OpenOptions},
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Shape of the position state file.
#[derive(Debug, Serialize, Deserialize)]
struct PositionState {
    latest_event_id: String,
}

/// Durable storage for the three session artifacts: the metrics snapshot
/// (overwrite), the stream position (overwrite), and the alert log (append).
///
/// The overwrite slots are replaced atomically (write to a sibling temp file,
/// then rename), so a crash mid-flush never leaves a half-written slot behind.
pub struct StateStore {
    metrics_path: PathBuf,
    state_path: PathBuf,
    alerts_path: PathBuf,
}

impl StateStore {
    pub fn new(
        metrics_path: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        alerts_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            metrics_path: metrics_path.into(),
            state_path: state_path.into(),
            alerts_path: alerts_path.into(),
        }
    }

    /// Overwrite the metrics snapshot.
    pub fn save_metrics(&self, metrics: &Metrics) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(metrics)?;
        write_atomic(&self.metrics_path, json.as_bytes())?;
        log::debug!("Saved metrics snapshot to {}", self.metrics_path.display());
        Ok(())
    }

    /// Load the previous metrics snapshot; a missing file is not an error.
    pub fn load_metrics(&self) -> Result<Option<Metrics>, StoreError> {
        if !self.metrics_path.exists() {
            log::info!("No existing metrics snapshot: {}", self.metrics_path.display());
            return Ok(None);
        }
        let json = fs::read_to_string(&self.metrics_path)?;
        let metrics: Metrics = serde_json::from_str(&json)?;
        log::info!("Loaded metrics snapshot from {}", self.metrics_path.display());
        Ok(Some(metrics))
    }

    /// Overwrite the persisted stream position.
    pub fn save_position(&self, token: &str) -> Result<(), StoreError> {
        let state = PositionState {
            latest_event_id: token.to_string(),
        };
        let json = serde_json::to_string(&state)?;
        write_atomic(&self.state_path, json.as_bytes())?;
        Ok(())
    }

    /// Load the persisted stream position; a missing or unreadable file means
    /// no resume point, never a hard error.
    pub fn load_position(&self) -> Result<Option<String>, StoreError> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.state_path)?;
        match serde_json::from_str::<PositionState>(&json) {
            Ok(state) => Ok(Some(state.latest_event_id)),
            Err(e) => {
                log::warn!("Ignoring unreadable position state: {}", e);
                Ok(None)
            }
        }
    }

    /// Append one raw event to the alert log (JSON-Lines, one record per call).
    pub fn append_alert(&self, event: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.alerts_path)?;
        writeln!(file, "{}", json)?;
        file.flush()?;
        Ok(())
    }
}

/// Write the full content to a sibling temp file, then rename over the
/// destination. Rename within one directory is atomic on POSIX, so readers
/// observe either the old or the new content, never a partial write.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
