use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use tracing::{debug, info};

use clog_types::{ChangeEvent, ConsumerId, NewEvent, Offset};

use crate::error::StoreResult;
use crate::index::EventIndex;
use crate::traits::{EventStore, ProgressStore};

/// In-memory event store.
///
/// Intended for tests and embedding. Appends are serialized by a writer
/// mutex; reads only contend with the index push itself.
pub struct InMemoryEventStore {
    writer: Mutex<()>,
    index: EventIndex,
}

impl InMemoryEventStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            index: EventIndex::new(),
        }
    }

    /// Number of events currently stored.
    pub fn len(&self) -> usize {
        self.index.next_offset() as usize
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: NewEvent) -> StoreResult<ChangeEvent> {
        let _writer = self.writer.lock().expect("writer mutex poisoned");
        self.index.ensure_open()?;

        let offset = self.index.next_offset();
        let stamped = ChangeEvent::stamp(event, offset, Utc::now());
        self.index.publish(stamped.clone());

        debug!(offset, event_type = %stamped.event_type, "event appended");
        Ok(stamped)
    }

    fn next_offset(&self) -> Offset {
        self.index.next_offset()
    }

    fn get(&self, offset: Offset) -> StoreResult<Option<ChangeEvent>> {
        self.index.ensure_open()?;
        Ok(self.index.get(offset))
    }

    fn read_range(&self, from: Offset, to: Offset) -> StoreResult<Vec<ChangeEvent>> {
        self.index.ensure_open()?;
        Ok(self.index.range(from, to))
    }

    fn close(&self) -> StoreResult<()> {
        let _writer = self.writer.lock().expect("writer mutex poisoned");
        if self.index.close() {
            info!(next_offset = self.index.next_offset(), "in-memory event store closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.index.is_closed()
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("next_offset", &self.index.next_offset())
            .field("closed", &self.index.is_closed())
            .finish()
    }
}

/// In-memory progress store. Keeps the highest offset per consumer.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    progress: RwLock<HashMap<ConsumerId, Offset>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest offset recorded for `consumer`, if any.
    pub fn get(&self, consumer: &ConsumerId) -> Option<Offset> {
        self.progress
            .read()
            .expect("progress lock poisoned")
            .get(consumer)
            .copied()
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn record(&self, consumer: &ConsumerId, offset: Offset) -> StoreResult<()> {
        let mut progress = self.progress.write().expect("progress lock poisoned");
        let entry = progress.entry(consumer.clone()).or_insert(offset);
        *entry = (*entry).max(offset);
        Ok(())
    }

    fn rewind(&self, consumer: &ConsumerId, offset: Option<Offset>) -> StoreResult<()> {
        let mut progress = self.progress.write().expect("progress lock poisoned");
        match offset {
            Some(offset) => progress.insert(consumer.clone(), offset),
            None => progress.remove(consumer),
        };
        Ok(())
    }

    fn load(&self) -> StoreResult<Vec<(ConsumerId, Offset)>> {
        let progress = self.progress.read().expect("progress lock poisoned");
        let mut all: Vec<(ConsumerId, Offset)> =
            progress.iter().map(|(c, o)| (c.clone(), *o)).collect();
        all.sort();
        Ok(all)
    }
}
