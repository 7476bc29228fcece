//! Write-ahead-log backed stores.
//!
//! Both stores keep their full state in memory and use a single WAL file as
//! the durable copy, replayed on open:
//!
//! ```text
//! <data_dir>/events.wal    one ChangeEvent per record, offset order
//! <data_dir>/progress.wal  one ProgressRecord per raised ack or rewind
//! ```

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use clog_types::{ChangeEvent, ConsumerId, NewEvent, Offset};

use crate::error::{StoreError, StoreResult};
use crate::index::EventIndex;
use crate::memory::InMemoryProgressStore;
use crate::traits::{EventStore, ProgressStore};
use crate::wal::{WalConfig, WriteAheadLog};

pub const EVENTS_FILE: &str = "events.wal";
pub const PROGRESS_FILE: &str = "progress.wal";

/// Event store persisted to `events.wal`.
///
/// An append writes the WAL record first and only then publishes the event in
/// the in-memory index, so a failed write leaves `next_offset` untouched.
/// Readers are never blocked by disk I/O.
pub struct WalEventStore {
    wal: WriteAheadLog<ChangeEvent>,
    writer: Mutex<()>,
    index: EventIndex,
}

impl WalEventStore {
    /// Open (or create) the event log in `data_dir` and replay it.
    pub fn open(data_dir: &Path, config: WalConfig) -> StoreResult<Self> {
        let path = data_dir.join(EVENTS_FILE);
        let wal: WriteAheadLog<ChangeEvent> = WriteAheadLog::open(&path, config)?;
        let events = wal.recover()?;

        for (expected, event) in events.iter().enumerate() {
            if event.offset != expected as Offset {
                return Err(StoreError::OffsetGap {
                    path,
                    expected: expected as Offset,
                    found: event.offset,
                });
            }
        }

        info!(path = %path.display(), events = events.len(), "event log recovered");

        Ok(Self {
            wal,
            writer: Mutex::new(()),
            index: EventIndex::with_events(events),
        })
    }

    pub fn path(&self) -> &Path {
        self.wal.path()
    }
}

impl EventStore for WalEventStore {
    fn append(&self, event: NewEvent) -> StoreResult<ChangeEvent> {
        let _writer = self.writer.lock().expect("writer mutex poisoned");
        self.index.ensure_open()?;

        let offset = self.index.next_offset();
        let stamped = ChangeEvent::stamp(event, offset, Utc::now());
        self.wal.append(&stamped)?;
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
            self.wal.sync()?;
            info!(
                path = %self.wal.path().display(),
                next_offset = self.index.next_offset(),
                "event log closed"
            );
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.index.is_closed()
    }
}

/// One progress change as written to `progress.wal`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum ProgressRecord {
    /// Raised acknowledgment; folded with `max`.
    Ack { consumer: ConsumerId, offset: Offset },
    /// Exact reset; `None` forgets the consumer.
    Rewind {
        consumer: ConsumerId,
        offset: Option<Offset>,
    },
}

/// Progress store persisted to `progress.wal`.
///
/// Recovery folds acknowledgments with `max`, so records written out of order
/// by concurrent acknowledgments still recover to the highest offset. Rewinds
/// apply in file order.
pub struct WalProgressStore {
    wal: WriteAheadLog<ProgressRecord>,
    progress: InMemoryProgressStore,
}

impl WalProgressStore {
    pub fn open(data_dir: &Path, config: WalConfig) -> StoreResult<Self> {
        let path = data_dir.join(PROGRESS_FILE);
        let wal: WriteAheadLog<ProgressRecord> = WriteAheadLog::open(&path, config)?;
        let progress = InMemoryProgressStore::new();

        let records = wal.recover()?;
        for record in &records {
            match record {
                ProgressRecord::Ack { consumer, offset } => progress.record(consumer, *offset)?,
                ProgressRecord::Rewind { consumer, offset } => progress.rewind(consumer, *offset)?,
            }
        }

        info!(path = %path.display(), records = records.len(), "consumer progress recovered");
        Ok(Self { wal, progress })
    }
}

impl ProgressStore for WalProgressStore {
    fn record(&self, consumer: &ConsumerId, offset: Offset) -> StoreResult<()> {
        if self.progress.get(consumer).is_some_and(|current| current >= offset) {
            return Ok(());
        }
        self.wal.append(&ProgressRecord::Ack {
            consumer: consumer.clone(),
            offset,
        })?;
        self.progress.record(consumer, offset)
    }

    fn rewind(&self, consumer: &ConsumerId, offset: Option<Offset>) -> StoreResult<()> {
        self.wal.append(&ProgressRecord::Rewind {
            consumer: consumer.clone(),
            offset,
        })?;
        info!(consumer = %consumer, offset = ?offset, "consumer progress rewound");
        self.progress.rewind(consumer, offset)
    }

    fn load(&self) -> StoreResult<Vec<(ConsumerId, Offset)>> {
        self.progress.load()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;

    use super::*;
    use crate::wal::SyncMode;

    fn event(kind: &str) -> NewEvent {
        NewEvent::new(kind, "wal-test").with_after(kind.as_bytes().to_vec())
    }

    #[test]
    fn events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let appended: Vec<ChangeEvent> = {
            let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
            ["create", "update", "delete"]
                .into_iter()
                .map(|k| store.append(event(k)).unwrap())
                .collect()
        };

        let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
        assert_eq!(store.next_offset(), 3);
        assert_eq!(store.read_range(0, 3).unwrap(), appended);

        let next = store.append(event("create")).unwrap();
        assert_eq!(next.offset, 3);
    }

    #[test]
    fn recovered_events_keep_their_ids() {
        let dir = tempfile::tempdir().unwrap();
        let original = {
            let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
            store.append(event("create")).unwrap()
        };
        let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
        let recovered = store.get(0).unwrap().unwrap();
        assert_eq!(recovered.event_id, original.event_id);
        assert!(recovered.verify_id());
    }

    #[test]
    fn torn_tail_loses_only_the_last_event() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
            store.append(event("a")).unwrap();
            store.append(event("b")).unwrap();
        }
        let path = dir.path().join(EVENTS_FILE);
        let len = std::fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();

        let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
        assert_eq!(store.next_offset(), 1);
        assert_eq!(store.append(event("c")).unwrap().offset, 1);
    }

    #[test]
    fn mid_log_corruption_is_an_offset_gap() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
            for k in ["a", "b", "c"] {
                store.append(event(k)).unwrap();
            }
        }

        // Flip the last byte of the first record's payload.
        let path = dir.path().join(EVENTS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let first_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        bytes[8 + first_len - 1] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let err = WalEventStore::open(dir.path(), WalConfig::default()).err().unwrap();
        assert!(matches!(
            err,
            StoreError::OffsetGap {
                expected: 0,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn damaged_first_header_refuses_to_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = WalEventStore::open(dir.path(), WalConfig::default()).unwrap();
            for k in ["a", "b", "c"] {
                store.append(event(k)).unwrap();
            }
        }

        let path = dir.path().join(EVENTS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let len_before = bytes.len() as u64;
        bytes[3] = 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let err = WalEventStore::open(dir.path(), WalConfig::default()).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { position: 0, .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn closed_wal_store_rejects_appends() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let store = WalEventStore::open(dir.path(), config).unwrap();
        store.append(event("a")).unwrap();
        store.close().unwrap();
        assert!(matches!(store.append(event("b")), Err(StoreError::Closed)));
        assert_eq!(store.next_offset(), 1);
    }

    #[test]
    fn progress_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let x = ConsumerId::new("consumerX").unwrap();
        let y = ConsumerId::new("consumerY").unwrap();
        {
            let store = WalProgressStore::open(dir.path(), WalConfig::default()).unwrap();
            store.record(&x, 2).unwrap();
            store.record(&x, 7).unwrap();
            store.record(&y, 1).unwrap();
        }
        let store = WalProgressStore::open(dir.path(), WalConfig::default()).unwrap();
        assert_eq!(store.load().unwrap(), vec![(x, 7), (y, 1)]);
    }

    #[test]
    fn lower_progress_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalProgressStore::open(dir.path(), WalConfig::default()).unwrap();
        let x = ConsumerId::new("consumerX").unwrap();
        store.record(&x, 5).unwrap();
        let len_after_first = std::fs::metadata(dir.path().join(PROGRESS_FILE)).unwrap().len();
        store.record(&x, 3).unwrap();
        store.record(&x, 5).unwrap();
        let len_after_dupes = std::fs::metadata(dir.path().join(PROGRESS_FILE)).unwrap().len();
        assert_eq!(len_after_first, len_after_dupes);
        assert_eq!(store.load().unwrap(), vec![(x, 5)]);
    }

    #[test]
    fn rewind_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let x = ConsumerId::new("consumerX").unwrap();
        let y = ConsumerId::new("consumerY").unwrap();
        {
            let store = WalProgressStore::open(dir.path(), WalConfig::default()).unwrap();
            store.record(&x, 7).unwrap();
            store.record(&y, 3).unwrap();
            store.rewind(&x, Some(1)).unwrap();
            store.rewind(&y, None).unwrap();
            store.record(&x, 2).unwrap();
        }
        let store = WalProgressStore::open(dir.path(), WalConfig::default()).unwrap();
        assert_eq!(store.load().unwrap(), vec![(x, 2)]);
    }
}
