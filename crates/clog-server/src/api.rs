//! JSON request and response bodies. Payloads travel hex-encoded.

use serde::{Deserialize, Serialize};

use clog_stream::{CursorInfo, StreamStats};
use clog_types::{ChangeEvent, NewEvent, Offset};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendRequest {
    pub event_type: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub source: String,
}

impl AppendRequest {
    pub fn into_new_event(self) -> ServerResult<NewEvent> {
        let before = decode_payload("before", &self.before)?;
        let after = decode_payload("after", &self.after)?;
        Ok(NewEvent::new(self.event_type, self.source)
            .with_before(before)
            .with_after(after))
    }
}

fn decode_payload(field: &str, text: &str) -> ServerResult<Vec<u8>> {
    hex::decode(text).map_err(|e| ServerError::BadRequest(format!("{field}: {e}")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    pub offset: Offset,
    pub event_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    pub offset: Offset,
    pub event_id: String,
    pub event_type: String,
    pub before: String,
    pub after: String,
    pub source: String,
    /// RFC 3339.
    pub timestamp: String,
}

impl From<&ChangeEvent> for EventView {
    fn from(e: &ChangeEvent) -> Self {
        Self {
            offset: e.offset,
            event_id: e.event_id.to_hex(),
            event_type: e.event_type.clone(),
            before: hex::encode(&e.before),
            after: hex::encode(&e.after),
            source: e.source.clone(),
            timestamp: e.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventView>,
}

impl EventsResponse {
    pub fn new(events: &[ChangeEvent]) -> Self {
        Self {
            events: events.iter().map(EventView::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub cursor_id: String,
    pub position: Offset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub events: Vec<EventView>,
    /// Cursor position after this read.
    pub position: Offset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorView {
    pub cursor_id: String,
    pub owner: Option<String>,
    pub from_offset: Offset,
    pub position: Offset,
}

impl From<CursorInfo> for CursorView {
    fn from(info: CursorInfo) -> Self {
        Self {
            cursor_id: info.id.to_string(),
            owner: info.owner,
            from_offset: info.from_offset,
            position: info.position,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub consumer: String,
    /// `None` until the consumer acknowledges something.
    pub acknowledged_offset: Option<Offset>,
    pub resume_offset: Offset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumersResponse {
    pub consumers: Vec<ProgressResponse>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub closed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub next_offset: Offset,
    pub open_cursors: usize,
    pub tracked_consumers: usize,
    pub max_read_batch: usize,
}

impl InfoResponse {
    pub fn new(stats: &StreamStats, max_read_batch: usize) -> Self {
        Self {
            name: "clog-server".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            next_offset: stats.next_offset,
            open_cursors: stats.open_cursors,
            tracked_consumers: stats.tracked_consumers,
            max_read_batch,
        }
    }
}
