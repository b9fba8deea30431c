/// Errors from the persistence store (metrics snapshot, position state, alert log).
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the stream subscription.
#[derive(Debug)]
pub enum SubscriptionError {
    Connect(String),
    Read(String),
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionError::Connect(msg) => write!(f, "Connection error: {}", msg),
            SubscriptionError::Read(msg) => write!(f, "Stream read error: {}", msg),
        }
    }
}

impl std::error::Error for SubscriptionError {}

/// Terminal failure of a processing session.
///
/// Recoverable conditions (malformed payloads, flush failures, alert write
/// failures) never surface here; they are logged where they happen and the
/// loop continues.
#[derive(Debug)]
pub enum SessionError {
    Transport(SubscriptionError),
    MaxRetries,
}

impl From<SubscriptionError> for SessionError {
    fn from(err: SubscriptionError) -> Self {
        SessionError::Transport(err)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Transport(e) => write!(f, "Transport failure: {}", e),
            SessionError::MaxRetries => write!(f, "Maximum reconnect attempts exceeded"),
        }
    }
}

impl std::error::Error for SessionError {}
