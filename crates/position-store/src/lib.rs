//! The durable position store and trade log (spec C5): one
//! write-temp-then-rename snapshot file per bot, plus an append-only
//! trade log file per bot. Synchronous filesystem I/O — callers on the
//! async trading loop run these through `tokio::task::spawn_blocking`
//! at transition points, which are infrequent relative to the cycle
//! interval.

pub mod error;
pub mod snapshot;
pub mod trade_log;

pub use error::PositionStoreError;

use core_types::{PositionSnapshot, TradeLogEntry};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A thin handle bundling a data directory with the snapshot/trade-log
/// free functions, so callers don't thread a `&Path` through every
/// call site.
#[derive(Debug, Clone)]
pub struct PositionStore {
    data_dir: PathBuf,
}

impl PositionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn load(&self, bot_id: Uuid) -> Result<Option<PositionSnapshot>, PositionStoreError> {
        snapshot::load(&self.data_dir, bot_id)
    }

    pub fn save(&self, snapshot: &PositionSnapshot) -> Result<(), PositionStoreError> {
        snapshot::save(&self.data_dir, snapshot)
    }

    pub fn delete(&self, bot_id: Uuid) -> Result<(), PositionStoreError> {
        snapshot::delete(&self.data_dir, bot_id)
    }

    pub fn append_trade(&self, entry: &TradeLogEntry) -> Result<(), PositionStoreError> {
        trade_log::append(&self.data_dir, entry)
    }

    pub fn tail_trades(&self, bot_id: Uuid, limit: usize) -> Result<Vec<TradeLogEntry>, PositionStoreError> {
        trade_log::tail(&self.data_dir, bot_id, limit)
    }
}
