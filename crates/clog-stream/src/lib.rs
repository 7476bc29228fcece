//! Ordered, resumable consumption of the change log.
//!
//! This crate layers consumer bookkeeping over a [`clog_store::EventStore`]:
//! - [`CursorRegistry`] -- per-subscription read cursors that advance on `read`
//! - [`AckTracker`] -- per-consumer acknowledged offsets for at-least-once
//!   processing across restarts
//! - [`RangeReplay`] -- bounded inclusive-range reads, independent of cursors
//! - [`ChangeStream`] -- the facade tying the three to one store
//!
//! Cursors are session state and die with the process. Consumers that must
//! survive a restart acknowledge what they have processed and resubscribe
//! from [`ChangeStream::resume_offset`].

pub mod ack;
pub mod cursor;
pub mod error;
pub mod replay;
pub mod stream;

pub use ack::AckTracker;
pub use cursor::{CursorInfo, CursorRegistry, ReadBatch};
pub use error::{ErrorKind, StreamError, StreamResult};
pub use replay::RangeReplay;
pub use stream::{
    ChangeStream, DEFAULT_MAX_READ_BATCH, DurableChangeStream, MemoryChangeStream,
    SharedChangeStream, StreamConfig, StreamStats,
};
