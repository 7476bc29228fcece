//! Append-only event storage for the change log.
//!
//! Every event lives at a dense `u64` offset assigned at append time. A store
//! owns offset assignment and publication; higher layers (cursors, acks,
//! replay) only ever read below [`EventStore::next_offset`].
//!
//! # Storage Backends
//!
//! Event stores implement [`EventStore`], progress stores implement
//! [`ProgressStore`]:
//!
//! - [`InMemoryEventStore`] / [`InMemoryProgressStore`] -- for tests and embedding
//! - [`WalEventStore`] / [`WalProgressStore`] -- state replayed from a
//!   [`WriteAheadLog`] file in a data directory
//!
//! # Design Rules
//!
//! 1. Events are immutable once appended.
//! 2. Write-then-publish: store the event, then advance `next_offset`.
//! 3. Appends are serialized; reads run concurrently with them.
//! 4. A failed append consumes no offset.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
mod index;
pub mod memory;
pub mod traits;
pub mod wal;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use file::{EVENTS_FILE, PROGRESS_FILE, WalEventStore, WalProgressStore};
pub use memory::{InMemoryEventStore, InMemoryProgressStore};
pub use traits::{EventStore, ProgressStore};
pub use wal::{SyncMode, WalConfig, WriteAheadLog};
