//! Foundation types for the change log.
//!
//! Every other `clog-*` crate depends on this one. It defines the values that
//! flow between producers, the event store, and consumers, and nothing here
//! performs I/O or holds locks.
//!
//! # Key Types
//!
//! - [`Offset`] -- position of an event in the log, the sole ordering key
//! - [`EventId`] -- content-derived BLAKE3 identifier for idempotency checks
//! - [`CursorId`] -- opaque, time-ordered handle for a read cursor (UUID v7)
//! - [`ConsumerId`] -- stable, caller-chosen name keyed by acknowledgments
//! - [`NewEvent`] -- what a producer submits to `append`
//! - [`ChangeEvent`] -- an immutable, offset-stamped event as stored

pub mod consumer;
pub mod error;
pub mod event;
pub mod id;

pub use consumer::ConsumerId;
pub use error::TypeError;
pub use event::{ChangeEvent, NewEvent, Offset};
pub use id::{CursorId, EventId};
