use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use clog_store::{
    InMemoryEventStore, InMemoryProgressStore, SyncMode, WalConfig, WalEventStore,
    WalProgressStore,
};
use clog_stream::{DEFAULT_MAX_READ_BATCH, SharedChangeStream, StreamConfig};

use crate::error::{ServerError, ServerResult};

/// Server settings, loadable from a TOML file. Missing keys take defaults.
///
/// ```toml
/// bind_addr = "0.0.0.0:7070"
/// data_dir = "/var/lib/clog"
/// sync_mode = "every-write"
/// max_read_batch = 100
/// long_poll_max_ms = 30000
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding `events.wal` and `progress.wal`. `None` keeps
    /// everything in memory.
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
    pub max_read_batch: usize,
    /// Upper bound on a read's `wait_ms`.
    pub long_poll_max_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7070)),
            data_dir: None,
            sync_mode: SyncMode::default(),
            max_read_batch: DEFAULT_MAX_READ_BATCH,
            long_poll_max_ms: 30_000,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_file(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.max_read_batch == 0 {
            return Err(ServerError::Config("max_read_batch must be at least 1".into()));
        }
        Ok(())
    }

    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            sync_mode: self.sync_mode,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_read_batch: self.max_read_batch,
        }
    }

    /// Open the stream this configuration describes.
    pub fn open_stream(&self) -> ServerResult<Arc<SharedChangeStream>> {
        let stream = match &self.data_dir {
            Some(dir) => SharedChangeStream::shared(
                WalEventStore::open(dir, self.wal_config())?,
                WalProgressStore::open(dir, self.wal_config())?,
                self.stream_config(),
            )?,
            None => SharedChangeStream::shared(
                InMemoryEventStore::new(),
                InMemoryProgressStore::new(),
                self.stream_config(),
            )?,
        };
        Ok(Arc::new(stream))
    }
}
