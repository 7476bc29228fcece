use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use clog_store::{
    EventStore, InMemoryEventStore, InMemoryProgressStore, ProgressStore, WalConfig,
    WalEventStore, WalProgressStore,
};
use clog_types::{ChangeEvent, ConsumerId, CursorId, NewEvent, Offset};

use crate::ack::AckTracker;
use crate::cursor::{CursorInfo, CursorRegistry, ReadBatch};
use crate::error::{StreamError, StreamResult};
use crate::replay::RangeReplay;

/// Largest batch a single `read` returns unless configured otherwise.
pub const DEFAULT_MAX_READ_BATCH: usize = 100;

/// Tuning knobs for a [`ChangeStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upper bound applied to every `read`'s `max_count`.
    pub max_read_batch: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_read_batch: DEFAULT_MAX_READ_BATCH,
        }
    }
}

/// Point-in-time counters for a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamStats {
    pub next_offset: Offset,
    pub open_cursors: usize,
    pub tracked_consumers: usize,
    pub closed: bool,
}

/// The change log: an event store plus cursors, acknowledgments and replay.
///
/// Every method takes `&self`; share a stream across threads with `Arc`.
pub struct ChangeStream<S, P> {
    store: S,
    cursors: CursorRegistry,
    acks: AckTracker<P>,
    config: StreamConfig,
}

/// A non-durable stream, for tests and embedding.
pub type MemoryChangeStream = ChangeStream<InMemoryEventStore, InMemoryProgressStore>;

/// A stream whose events and progress live in a data directory.
pub type DurableChangeStream = ChangeStream<WalEventStore, WalProgressStore>;

/// A stream over type-erased backends, chosen at runtime.
pub type SharedChangeStream = ChangeStream<Arc<dyn EventStore>, Arc<dyn ProgressStore>>;

impl<S, P> ChangeStream<S, P>
where
    S: EventStore,
    P: ProgressStore,
{
    /// Assemble a stream, recovering consumer progress from `progress`.
    pub fn open(store: S, progress: P, config: StreamConfig) -> StreamResult<Self> {
        let acks = AckTracker::recover(progress, store.next_offset())?;
        info!(
            next_offset = store.next_offset(),
            max_read_batch = config.max_read_batch,
            "change stream opened"
        );
        Ok(Self {
            store,
            cursors: CursorRegistry::new(),
            acks,
            config,
        })
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append an event and return it as stored.
    ///
    /// Retrying a failed or timed-out append creates a new, distinct event;
    /// compare `event_id`s to detect duplicates.
    pub fn append(&self, event: NewEvent) -> StreamResult<ChangeEvent> {
        if event.event_type.trim().is_empty() {
            return Err(StreamError::InvalidEventType(
                "event type must not be empty".into(),
            ));
        }
        self.ensure_open()?;
        Ok(self.store.append(event)?)
    }

    pub fn next_offset(&self) -> Offset {
        self.store.next_offset()
    }

    pub fn get(&self, offset: Offset) -> StreamResult<ChangeEvent> {
        self.store
            .get(offset)?
            .ok_or(StreamError::EventNotFound(offset))
    }

    // -----------------------------------------------------------------------
    // Cursors
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, from: Offset) -> StreamResult<CursorId> {
        self.subscribe_as(from, None)
    }

    /// Subscribe, recording `owner` on the cursor.
    pub fn subscribe_as(&self, from: Offset, owner: Option<String>) -> StreamResult<CursorId> {
        self.ensure_open()?;
        self.cursors.subscribe(&self.store, from, owner)
    }

    /// Read up to `max_count` events (capped by `max_read_batch`) and
    /// advance the cursor past them.
    pub fn read(&self, cursor: &CursorId, max_count: usize) -> StreamResult<Vec<ChangeEvent>> {
        Ok(self.read_batch(cursor, max_count)?.events)
    }

    /// [`read`](Self::read), plus the cursor position the read left behind.
    pub fn read_batch(&self, cursor: &CursorId, max_count: usize) -> StreamResult<ReadBatch> {
        self.ensure_open()?;
        let max = max_count.min(self.config.max_read_batch);
        self.cursors.read_batch(&self.store, cursor, max)
    }

    pub fn unsubscribe(&self, cursor: &CursorId) -> StreamResult<()> {
        self.ensure_open()?;
        self.cursors.unsubscribe(cursor)
    }

    pub fn cursor_info(&self, cursor: &CursorId) -> StreamResult<CursorInfo> {
        self.ensure_open()?;
        self.cursors.info(cursor)
    }

    // -----------------------------------------------------------------------
    // Acknowledgments
    // -----------------------------------------------------------------------

    /// Raise `consumer`'s progress to `offset`. Returns the progress after
    /// the call, which is higher than `offset` if a later ack already landed.
    pub fn acknowledge(&self, consumer: &ConsumerId, offset: Offset) -> StreamResult<Offset> {
        self.ensure_open()?;
        self.acks
            .acknowledge(consumer, offset, self.store.next_offset())
    }

    /// `None` means the consumer has never acknowledged anything.
    pub fn progress(&self, consumer: &ConsumerId) -> StreamResult<Option<Offset>> {
        self.ensure_open()?;
        Ok(self.acks.progress(consumer))
    }

    /// Offset a restarted consumer should subscribe from.
    pub fn resume_offset(&self, consumer: &ConsumerId) -> StreamResult<Offset> {
        self.ensure_open()?;
        Ok(self.acks.resume_offset(consumer))
    }

    /// Every consumer's progress, sorted by consumer id.
    pub fn consumers(&self) -> StreamResult<Vec<(ConsumerId, Offset)>> {
        self.ensure_open()?;
        Ok(self.acks.all())
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    pub fn replay(&self, from: Offset, to: Offset) -> StreamResult<Vec<ChangeEvent>> {
        self.ensure_open()?;
        RangeReplay::replay(&self.store, from, to)
    }

    pub fn replay_from(&self, from: Offset) -> StreamResult<Vec<ChangeEvent>> {
        self.ensure_open()?;
        RangeReplay::replay_from(&self.store, from)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Close the underlying store. Every later call fails with `Closed`.
    pub fn close(&self) -> StreamResult<()> {
        self.store.close()?;
        info!(
            next_offset = self.store.next_offset(),
            open_cursors = self.cursors.len(),
            "change stream closed"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            next_offset: self.store.next_offset(),
            open_cursors: self.cursors.len(),
            tracked_consumers: self.acks.tracked(),
            closed: self.store.is_closed(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn ensure_open(&self) -> StreamResult<()> {
        if self.store.is_closed() {
            warn!("operation rejected: change stream is closed");
            return Err(StreamError::Closed);
        }
        Ok(())
    }
}

impl MemoryChangeStream {
    /// A fresh, empty, non-durable stream.
    pub fn in_memory(config: StreamConfig) -> Self {
        Self {
            store: InMemoryEventStore::new(),
            cursors: CursorRegistry::new(),
            acks: AckTracker::new(InMemoryProgressStore::new()),
            config,
        }
    }
}

impl DurableChangeStream {
    /// Open (or create) a durable stream in `data_dir`.
    pub fn open_dir(data_dir: &Path, wal: WalConfig, config: StreamConfig) -> StreamResult<Self> {
        debug!(data_dir = %data_dir.display(), sync_mode = ?wal.sync_mode, "opening data directory");
        let events = WalEventStore::open(data_dir, wal.clone())?;
        let progress = WalProgressStore::open(data_dir, wal)?;
        Self::open(events, progress, config)
    }
}

impl SharedChangeStream {
    /// Erase the backend types so callers can pick them at runtime.
    pub fn shared<S, P>(store: S, progress: P, config: StreamConfig) -> StreamResult<Self>
    where
        S: EventStore + 'static,
        P: ProgressStore + 'static,
    {
        Self::open(Arc::new(store), Arc::new(progress), config)
    }
}
