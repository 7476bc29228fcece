use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use clog_store::EventStore;
use clog_types::{ChangeEvent, CursorId, Offset};

use crate::error::{StreamError, StreamResult};

/// Snapshot of a cursor's bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorInfo {
    pub id: CursorId,
    /// Identity recorded at subscribe time. Never enforced.
    pub owner: Option<String>,
    /// Where the subscription started.
    pub from_offset: Offset,
    /// Next offset `read` will return.
    pub position: Offset,
}

/// Events returned by one read, with the cursor position right after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadBatch {
    pub events: Vec<ChangeEvent>,
    /// Next offset the cursor will return, taken under the cursor's lock.
    pub position: Offset,
}

#[derive(Debug)]
struct Cursor {
    owner: Option<String>,
    from_offset: Offset,
    position: Offset,
}

/// Registry of live read cursors.
///
/// The map lock is held only to look a cursor up, insert or remove it. Each
/// cursor has its own mutex, so reads on one cursor are serialized while
/// reads on different cursors run in parallel.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    cursors: RwLock<HashMap<CursorId, Arc<Mutex<Cursor>>>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cursor positioned at `from`.
    ///
    /// `from == store.next_offset()` subscribes to future events only.
    pub fn subscribe<S>(&self, store: &S, from: Offset, owner: Option<String>) -> StreamResult<CursorId>
    where
        S: EventStore + ?Sized,
    {
        let next_offset = store.next_offset();
        if from > next_offset {
            return Err(StreamError::OutOfRange {
                offset: from,
                next_offset,
            });
        }

        let id = CursorId::new();
        let cursor = Cursor {
            owner,
            from_offset: from,
            position: from,
        };
        self.cursors
            .write()
            .expect("cursor registry lock poisoned")
            .insert(id, Arc::new(Mutex::new(cursor)));

        debug!(cursor = %id.short_id(), from, "cursor opened");
        Ok(id)
    }

    /// Return up to `max` events from the cursor's position and advance it by
    /// the number returned. Empty when the cursor is caught up.
    pub fn read<S>(&self, store: &S, id: &CursorId, max: usize) -> StreamResult<Vec<ChangeEvent>>
    where
        S: EventStore + ?Sized,
    {
        Ok(self.read_batch(store, id, max)?.events)
    }

    /// Like [`read`](Self::read), also reporting the position the read left
    /// the cursor at. Unaffected by concurrent reads or an unsubscribe.
    pub fn read_batch<S>(&self, store: &S, id: &CursorId, max: usize) -> StreamResult<ReadBatch>
    where
        S: EventStore + ?Sized,
    {
        let cursor = self.lookup(id)?;
        let mut cursor = cursor.lock().expect("cursor mutex poisoned");

        let start = cursor.position;
        let end = start.saturating_add(max as u64);
        let events = store.read_range(start, end)?;
        cursor.position += events.len() as Offset;

        debug!(
            cursor = %id.short_id(),
            from = start,
            returned = events.len(),
            position = cursor.position,
            "cursor read"
        );
        Ok(ReadBatch {
            events,
            position: cursor.position,
        })
    }

    /// Destroy a cursor. Later reads fail with `CursorNotFound`.
    pub fn unsubscribe(&self, id: &CursorId) -> StreamResult<()> {
        let removed = self
            .cursors
            .write()
            .expect("cursor registry lock poisoned")
            .remove(id);
        match removed {
            Some(_) => {
                debug!(cursor = %id.short_id(), "cursor closed");
                Ok(())
            }
            None => Err(StreamError::CursorNotFound(*id)),
        }
    }

    pub fn info(&self, id: &CursorId) -> StreamResult<CursorInfo> {
        let cursor = self.lookup(id)?;
        let cursor = cursor.lock().expect("cursor mutex poisoned");
        Ok(CursorInfo {
            id: *id,
            owner: cursor.owner.clone(),
            from_offset: cursor.from_offset,
            position: cursor.position,
        })
    }

    /// Number of open cursors.
    pub fn len(&self) -> usize {
        self.cursors.read().expect("cursor registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &CursorId) -> StreamResult<Arc<Mutex<Cursor>>> {
        self.cursors
            .read()
            .expect("cursor registry lock poisoned")
            .get(id)
            .cloned()
            .ok_or(StreamError::CursorNotFound(*id))
    }
}
