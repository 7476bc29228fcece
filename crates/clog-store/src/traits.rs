use clog_types::{ChangeEvent, ConsumerId, NewEvent, Offset};

use crate::error::StoreResult;

/// Append-only, offset-indexed event storage.
///
/// All implementations must satisfy these invariants:
/// - Offsets are assigned from 0 upwards with no gaps or duplicates, even
///   under concurrent `append` calls.
/// - An event is retrievable by `get` before `next_offset` reports a value
///   past it. Readers never see a published offset without its event.
/// - Events are never mutated or removed.
/// - A failed append leaves `next_offset` unchanged.
/// - Once closed, every fallible operation returns `StoreError::Closed`.
pub trait EventStore: Send + Sync {
    /// Stamp `event` with the next offset and the current time, store it,
    /// then publish the new `next_offset`.
    fn append(&self, event: NewEvent) -> StoreResult<ChangeEvent>;

    /// The offset the next appended event will receive.
    fn next_offset(&self) -> Offset;

    /// Read a single event.
    ///
    /// Returns `Ok(None)` if no event exists at `offset`.
    fn get(&self, offset: Offset) -> StoreResult<Option<ChangeEvent>>;

    /// Read the events in the half-open range `[from, to)` in ascending
    /// offset order. The range is clamped to `next_offset`.
    fn read_range(&self, from: Offset, to: Offset) -> StoreResult<Vec<ChangeEvent>>;

    /// Stop accepting operations. Idempotent.
    fn close(&self) -> StoreResult<()>;

    fn is_closed(&self) -> bool;
}

/// Durable sink for consumer acknowledgments.
///
/// The store keeps, per consumer, the highest offset ever recorded. Recording
/// a lower offset than the current one must not lower it; only `rewind` can.
pub trait ProgressStore: Send + Sync {
    /// Persist an acknowledgment.
    fn record(&self, consumer: &ConsumerId, offset: Offset) -> StoreResult<()>;

    /// Set `consumer`'s progress to exactly `offset`, or forget the consumer
    /// when `offset` is `None`. Used when progress points past a recovered
    /// event log.
    fn rewind(&self, consumer: &ConsumerId, offset: Option<Offset>) -> StoreResult<()>;

    /// Every consumer's highest recorded offset, sorted by consumer id.
    fn load(&self) -> StoreResult<Vec<(ConsumerId, Offset)>>;
}

impl<S> EventStore for std::sync::Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(&self, event: NewEvent) -> StoreResult<ChangeEvent> {
        (**self).append(event)
    }

    fn next_offset(&self) -> Offset {
        (**self).next_offset()
    }

    fn get(&self, offset: Offset) -> StoreResult<Option<ChangeEvent>> {
        (**self).get(offset)
    }

    fn read_range(&self, from: Offset, to: Offset) -> StoreResult<Vec<ChangeEvent>> {
        (**self).read_range(from, to)
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<S> ProgressStore for std::sync::Arc<S>
where
    S: ProgressStore + ?Sized,
{
    fn record(&self, consumer: &ConsumerId, offset: Offset) -> StoreResult<()> {
        (**self).record(consumer, offset)
    }

    fn rewind(&self, consumer: &ConsumerId, offset: Option<Offset>) -> StoreResult<()> {
        (**self).rewind(consumer, offset)
    }

    fn load(&self) -> StoreResult<Vec<(ConsumerId, Offset)>> {
        (**self).load()
    }
}
