use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use clog_types::{ChangeEvent, Offset};

use crate::error::{StoreError, StoreResult};

/// In-memory offset index shared by every event store backend.
///
/// `next_offset` is only advanced after the event has been pushed, so a
/// reader that loads `next_offset` first and then reads below it always finds
/// the events it expects. Callers must serialize `publish` themselves.
pub(crate) struct EventIndex {
    events: RwLock<Vec<ChangeEvent>>,
    next_offset: AtomicU64,
    closed: AtomicBool,
}

impl EventIndex {
    pub(crate) fn new() -> Self {
        Self::with_events(Vec::new())
    }

    /// Build from events already known to be contiguous from offset 0.
    pub(crate) fn with_events(events: Vec<ChangeEvent>) -> Self {
        let next = events.len() as Offset;
        Self {
            events: RwLock::new(events),
            next_offset: AtomicU64::new(next),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_offset(&self) -> Offset {
        self.next_offset.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        let mut events = self.events.write().expect("event index lock poisoned");
        debug_assert_eq!(event.offset, events.len() as Offset);
        events.push(event);
        self.next_offset
            .store(events.len() as Offset, Ordering::Release);
    }

    pub(crate) fn get(&self, offset: Offset) -> Option<ChangeEvent> {
        if offset >= self.next_offset() {
            return None;
        }
        let events = self.events.read().expect("event index lock poisoned");
        events.get(offset as usize).cloned()
    }

    pub(crate) fn range(&self, from: Offset, to: Offset) -> Vec<ChangeEvent> {
        let end = to.min(self.next_offset());
        if from >= end {
            return Vec::new();
        }
        let events = self.events.read().expect("event index lock poisoned");
        events[from as usize..end as usize].to_vec()
    }

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Mark closed. Returns `true` if this call performed the transition.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
