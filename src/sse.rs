use {
    crate::error::SubscriptionError,
    async_trait::async_trait,
    reqwest::header::{ACCEPT, USER_AGENT},
    std::time::Duration,
};

/// One item received from the stream.
///
/// `id` is the subscription's last-seen position token at the time this item
/// was dispatched; it is opaque to everything except the upstream server.
#[derive(Debug, Clone)]
pub struct StreamItem {
    pub event_type: String,
    pub data: String,
    pub id: Option<String>,
}

/// Pull-based handle over a server-pushed event stream.
///
/// `Ok(None)` means the server closed the stream; errors are read failures.
/// The supervisor is the only consumer.
#[async_trait]
pub trait EventSubscription: Send {
    async fn next_item(&mut self) -> Result<Option<StreamItem>, SubscriptionError>;
}

/// Incremental decoder for Server-Sent-Events framing.
///
/// Follows the WHATWG EventSource processing model: `data:` lines accumulate,
/// `event:` names the type, `id:` updates the stream-level last-event-id
/// (which every later item then carries), `:` lines are comments, and a blank
/// line dispatches the accumulated frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    event_type: String,
    data: String,
    last_event_id: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete item out of the buffer, if one is ready.
    pub fn next_frame(&mut self) -> Option<StreamItem> {
        while let Some(line) = self.take_line() {
            if let Some(item) = self.process_line(&line) {
                return Some(item);
            }
        }
        None
    }

    /// Extract one newline-terminated line from the byte buffer.
    ///
    /// UTF-8 decoding happens per line, so a multi-byte character split
    /// across transport chunks reassembles correctly.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // the \n
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<StreamItem> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment line; the upstream uses these as keepalives.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            // "retry" and unknown fields are ignored.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamItem> {
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            // Empty data buffer: reset without dispatching, per the
            // EventSource processing model. Covers comment-only keepalive
            // frames and bare `event:` lines.
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        let event_type = if event_type.is_empty() {
            "message".to_string()
        } else {
            event_type
        };

        Some(StreamItem {
            event_type,
            data,
            id: self.last_event_id.clone(),
        })
    }
}

/// Live SSE subscription over a long-lived HTTP response body.
pub struct SseSubscription {
    response: reqwest::Response,
    decoder: FrameDecoder,
}

impl SseSubscription {
    /// Open the stream, resuming from `resume_from` when given.
    ///
    /// The server replays everything after the supplied Last-Event-ID; `None`
    /// starts from the live head.
    pub async fn open(
        url: &str,
        user_agent: &str,
        resume_from: Option<&str>,
    ) -> Result<Self, SubscriptionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let mut request = client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(USER_AGENT, user_agent);
        if let Some(id) = resume_from {
            request = request.header("Last-Event-ID", id);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        Ok(Self {
            response,
            decoder: FrameDecoder::new(),
        })
    }
}

#[async_trait]
impl EventSubscription for SseSubscription {
    async fn next_item(&mut self) -> Result<Option<StreamItem>, SubscriptionError> {
        loop {
            if let Some(item) = self.decoder.next_frame() {
                return Ok(Some(item));
            }
            match self.response.chunk().await {
                Ok(Some(bytes)) => self.decoder.feed(&bytes),
                Ok(None) => return Ok(None),
                Err(e) => return Err(SubscriptionError::Read(e.to_string())),
            }
        }
    }
}
