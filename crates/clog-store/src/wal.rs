use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Flush/sync strategy for the WAL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Flush to the OS and rely on page-cache buffering.
    #[default]
    OsDefault,
}

/// Configuration for a write-ahead log file.
#[derive(Clone, Debug, Default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Frame starting at `at`, as `(expected_crc, payload)`, if its header is
/// complete and its length is non-zero and fits in `data`.
fn frame_at(data: &[u8], at: usize) -> Option<(u32, &[u8])> {
    let header = data.get(at..at.checked_add(HEADER_SIZE)?)?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if length == 0 {
        return None;
    }
    let body = at + HEADER_SIZE;
    let payload = data.get(body..body.checked_add(length)?)?;
    Some((crc, payload))
}

/// Whether a CRC-valid frame starts anywhere after `start`.
fn has_valid_frame_after(data: &[u8], start: usize) -> bool {
    ((start + 1)..data.len()).any(|at| {
        frame_at(data, at).is_some_and(|(crc, payload)| crc32fast::hash(payload) == crc)
    })
}

struct WalWriter {
    file: File,
    /// Current end of the file in bytes.
    offset: u64,
}

/// Crash-recoverable append-only record file.
///
/// On-disk format, repeated per record:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized T)]
/// ```
///
/// Records that fail the CRC check are skipped on recovery. A torn tail (a
/// header or payload cut short by a crash) is truncated away so that later
/// appends start on a record boundary. A damaged header with intact records
/// after it is reported as corruption and never truncated.
pub struct WriteAheadLog<T> {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    config: WalConfig,
    _record: PhantomData<fn() -> T>,
}

impl<T> WriteAheadLog<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (or create) a WAL file at the given path.
    pub fn open(path: &Path, config: WalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter { file, offset }),
            config,
            _record: PhantomData,
        })
    }

    /// Append a single record. Returns the byte position of the record.
    ///
    /// The record has reached the OS (and the disk, under
    /// [`SyncMode::EveryWrite`]) when this returns `Ok`.
    pub fn append(&self, record: &T) -> StoreResult<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("record larger than 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self.writer.lock().expect("WAL mutex poisoned");
        let position = w.offset;

        let mut written = w.file.write_all(&frame);
        if written.is_ok() && self.config.sync_mode == SyncMode::EveryWrite {
            written = w.file.sync_data();
        }
        if let Err(e) = written {
            // Drop whatever part of the frame made it out so the next append
            // starts on a record boundary.
            if let Err(trim) = w.file.set_len(position) {
                warn!(position, error = %trim, "failed to trim partial WAL record");
            }
            return Err(e.into());
        }

        w.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(position, len = payload.len(), "WAL append");
        Ok(position)
    }

    /// Read every valid record front-to-back.
    ///
    /// A bad frame header is only treated as a torn tail when no valid frame
    /// follows it; the file is then truncated at the bad header. Otherwise
    /// recovery fails with [`StoreError::Corrupt`] and the file is left as is.
    pub fn recover(&self) -> StoreResult<Vec<T>> {
        let data = fs::read(&self.path)?;
        let mut records = Vec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            let Some((expected_crc, payload)) = frame_at(&data, offset) else {
                if has_valid_frame_after(&data, offset) {
                    warn!(offset, file_len = data.len(), "invalid WAL header followed by valid records");
                    return Err(StoreError::Corrupt {
                        path: self.path.clone(),
                        position: offset as u64,
                    });
                }
                warn!(offset, file_len = data.len(), "invalid WAL header at tail; stopping recovery");
                break;
            };
            let next = offset + HEADER_SIZE + payload.len();

            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping entry"
                );
                offset = next;
                continue;
            }

            match bincode::deserialize::<T>(payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "failed to deserialize WAL entry; skipping"),
            }
            offset = next;
        }

        if offset < data.len() {
            self.truncate_to(offset as u64)?;
        }

        debug!(recovered = records.len(), "WAL recovery complete");
        Ok(records)
    }

    /// Flush buffered data and fsync the file.
    pub fn sync(&self) -> StoreResult<()> {
        let mut w = self.writer.lock().expect("WAL mutex poisoned");
        w.file.flush()?;
        w.file.sync_all()?;
        Ok(())
    }

    /// Current end of the file in bytes.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("WAL mutex poisoned").offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn truncate_to(&self, len: u64) -> StoreResult<()> {
        let mut w = self.writer.lock().expect("WAL mutex poisoned");
        w.file.set_len(len)?;
        w.file.sync_all()?;
        w.offset = len;
        warn!(path = %self.path.display(), len, "truncated torn WAL tail");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Record {
        seq: u64,
        body: String,
    }

    fn record(seq: u64) -> Record {
        Record {
            seq,
            body: format!("record-{seq}"),
        }
    }

    fn open(path: &Path) -> WriteAheadLog<Record> {
        WriteAheadLog::open(path, WalConfig::default()).unwrap()
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(&dir.path().join("test.wal"));

        for seq in 1..=3 {
            wal.append(&record(seq)).unwrap();
        }

        let recovered = wal.recover().unwrap();
        assert_eq!(recovered, vec![record(1), record(2), record(3)]);
    }

    #[test]
    fn recover_empty_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(&dir.path().join("empty.wal"));
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn recover_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.wal");
        {
            let wal = open(&path);
            wal.append(&record(1)).unwrap();
            wal.append(&record(2)).unwrap();
        }
        let wal = open(&path);
        assert_eq!(wal.recover().unwrap().len(), 2);
        wal.append(&record(3)).unwrap();
        assert_eq!(wal.recover().unwrap().len(), 3);
    }

    #[test]
    fn crc_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wal");
        {
            let wal = open(&path);
            wal.append(&record(1)).unwrap();
            wal.append(&record(2)).unwrap();
        }

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let wal = open(&path);
        let recovered = wal.recover().unwrap();
        assert_eq!(recovered, vec![record(2)]);
    }

    #[test]
    fn torn_tail_is_truncated_and_appends_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wal");
        let first_len;
        {
            let wal = open(&path);
            wal.append(&record(1)).unwrap();
            first_len = wal.offset();
            wal.append(&record(2)).unwrap();
            let total = wal.offset();
            drop(wal);
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total - 4).unwrap();
        }

        let wal = open(&path);
        assert_eq!(wal.recover().unwrap(), vec![record(1)]);
        assert_eq!(wal.offset(), first_len);
        assert_eq!(fs::metadata(&path).unwrap().len(), first_len);

        wal.append(&record(3)).unwrap();
        assert_eq!(wal.recover().unwrap(), vec![record(1), record(3)]);
    }

    #[test]
    fn damaged_header_before_valid_records_is_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header.wal");
        {
            let wal = open(&path);
            for seq in 1..=3 {
                wal.append(&record(seq)).unwrap();
            }
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[3] = 0xFF;
        fs::write(&path, &bytes).unwrap();

        let wal = open(&path);
        let err = wal.recover().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { position: 0, .. }));
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn damaged_header_at_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail-header.wal");
        let first_len;
        {
            let wal = open(&path);
            wal.append(&record(1)).unwrap();
            first_len = wal.offset();
            wal.append(&record(2)).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[first_len as usize + 3] = 0xFF;
        fs::write(&path, &bytes).unwrap();

        let wal = open(&path);
        assert_eq!(wal.recover().unwrap(), vec![record(1)]);
        assert_eq!(fs::metadata(&path).unwrap().len(), first_len);
    }

    #[test]
    fn append_returns_increasing_positions() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(&dir.path().join("positions.wal"));
        let p1 = wal.append(&record(1)).unwrap();
        let p2 = wal.append(&record(2)).unwrap();
        let p3 = wal.append(&record(3)).unwrap();
        assert_eq!(p1, 0);
        assert!(p2 > p1);
        assert!(p3 > p2);
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let wal: WriteAheadLog<Record> =
            WriteAheadLog::open(&dir.path().join("sync.wal"), config).unwrap();
        wal.append(&record(1)).unwrap();
        wal.sync().unwrap();
        assert_eq!(wal.recover().unwrap().len(), 1);
    }
}
