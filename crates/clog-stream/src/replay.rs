use tracing::debug;

use clog_store::EventStore;
use clog_types::{ChangeEvent, Offset};

use crate::error::{StreamError, StreamResult};

/// Bounded, cursor-free reads for audit and backfill.
///
/// Events are immutable, so a range that validates once returns the same
/// events on every later call.
pub struct RangeReplay;

impl RangeReplay {
    /// Every event with `from <= offset <= to`, ascending.
    pub fn replay<S>(store: &S, from: Offset, to: Offset) -> StreamResult<Vec<ChangeEvent>>
    where
        S: EventStore + ?Sized,
    {
        if from > to {
            return Err(StreamError::InvalidRange { from, to });
        }
        let next_offset = store.next_offset();
        if to >= next_offset {
            return Err(StreamError::OutOfRange {
                offset: to,
                next_offset,
            });
        }

        let events = store.read_range(from, to + 1)?;
        debug!(from, to, returned = events.len(), "range replayed");
        Ok(events)
    }

    /// Every event from `from` to the current end of the log.
    ///
    /// An empty log has no end to replay to and yields `OutOfRange`.
    pub fn replay_from<S>(store: &S, from: Offset) -> StreamResult<Vec<ChangeEvent>>
    where
        S: EventStore + ?Sized,
    {
        match store.next_offset() {
            0 => Err(StreamError::OutOfRange {
                offset: from,
                next_offset: 0,
            }),
            next_offset => Self::replay(store, from, next_offset - 1),
        }
    }
}
