use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reel_core::{ApiError, ApiResult, ConflictFeed, ConflictStream};
use reel_shared::{SeatConflictEvent, ShowtimeId};
use reqwest::Client;
use tracing::debug;

pub const CONFLICT_EVENT: &str = "seat_conflict";

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split lines anywhere,
/// including inside a multi-byte character; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]).trim_end_matches('\r').to_string();

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(SseFrame { event: self.event.take(), data: self.data.join("\n") });
                    self.data.clear();
                }
                self.event = None;
                continue;
            }
            // comment / keep-alive
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }
}

/// Decodes a frame into a conflict event. Frames with another event name
/// or an unreadable payload are skipped.
pub fn decode_conflict(frame: &SseFrame) -> Option<SeatConflictEvent> {
    if frame.event.as_deref().is_some_and(|name| name != CONFLICT_EVENT) {
        return None;
    }
    match serde_json::from_str(&frame.data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping malformed conflict frame: {}", e);
            None
        }
    }
}

/// `ConflictFeed` over Server-Sent Events at
/// `{base}/showtimes/{id}/conflicts`
#[derive(Clone)]
pub struct SseConflictFeed {
    client: Client,
    base_url: String,
}

impl SseConflictFeed {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl ConflictFeed for SseConflictFeed {
    async fn subscribe(&self, showtime_id: &ShowtimeId) -> ApiResult<ConflictStream> {
        let url = format!("{}/showtimes/{}/conflicts", self.base_url, showtime_id);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::status(response.status().as_u16(), "Realtime subscription refused"));
        }

        let mut bytes = response.bytes_stream();
        let showtime_id = showtime_id.clone();

        Ok(Box::pin(stream! {
            let mut parser = SseParser::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for frame in parser.push(&chunk) {
                            if let Some(event) = decode_conflict(&frame) {
                                yield event;
                            }
                        }
                    }
                    Err(e) => {
                        debug!(%showtime_id, "Realtime stream dropped: {}", e);
                        break;
                    }
                }
            }
        }))
    }
}
