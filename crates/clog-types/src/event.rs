use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EventId;

/// Position of an event in the log. Offsets start at 0 and have no gaps.
pub type Offset = u64;

/// An event as submitted by a producer, before the store stamps it.
///
/// `before` and `after` are opaque state images. A create carries an empty
/// `before`, a delete an empty `after`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub source: String,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_before(mut self, before: impl Into<Vec<u8>>) -> Self {
        self.before = before.into();
        self
    }

    pub fn with_after(mut self, after: impl Into<Vec<u8>>) -> Self {
        self.after = after.into();
        self
    }
}

/// An appended event. Immutable; its offset is the only authoritative order.
///
/// `timestamp` is the wall clock at append time and may go backwards between
/// consecutive offsets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub offset: Offset,
    pub event_id: EventId,
    pub event_type: String,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Stamp a submitted event with its offset and append time, deriving the
    /// event id.
    pub fn stamp(event: NewEvent, offset: Offset, timestamp: DateTime<Utc>) -> Self {
        let event_id = Self::compute_id(&event.event_type, &event.source, &timestamp, offset);
        Self {
            offset,
            event_id,
            event_type: event.event_type,
            before: event.before,
            after: event.after,
            source: event.source,
            timestamp,
        }
    }

    /// Recompute the id from the stored fields and compare.
    pub fn verify_id(&self) -> bool {
        Self::compute_id(&self.event_type, &self.source, &self.timestamp, self.offset)
            == self.event_id
    }

    /// BLAKE3 over (type, source, timestamp, offset). Variable-length fields
    /// are length-prefixed so that `("ab", "c")` and `("a", "bc")` differ.
    pub fn compute_id(
        event_type: &str,
        source: &str,
        timestamp: &DateTime<Utc>,
        offset: Offset,
    ) -> EventId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"clog-event-v1:");

        hasher.update(&(event_type.len() as u64).to_le_bytes());
        hasher.update(event_type.as_bytes());

        hasher.update(&(source.len() as u64).to_le_bytes());
        hasher.update(source.as_bytes());

        hasher.update(&timestamp.timestamp().to_le_bytes());
        hasher.update(&timestamp.timestamp_subsec_nanos().to_le_bytes());

        hasher.update(&offset.to_le_bytes());

        EventId::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn is_create(&self) -> bool {
        self.before.is_empty() && !self.after.is_empty()
    }

    pub fn is_delete(&self) -> bool {
        !self.before.is_empty() && self.after.is_empty()
    }
}
