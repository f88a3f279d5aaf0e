use crate::error::PositionStoreError;
use core_types::PositionSnapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

fn snapshot_path(data_dir: &Path, bot_id: Uuid) -> PathBuf {
    data_dir.join(format!("{bot_id}.position.json"))
}

/// Loads the durable position snapshot for `bot_id`, or `None` if the
/// bot is flat (or has never traded). Called once on bot start (spec
/// §4.5): if present, the position is in force; if absent, the caller
/// checks §4.7's orphan path.
pub fn load(data_dir: &Path, bot_id: Uuid) -> Result<Option<PositionSnapshot>, PositionStoreError> {
    let path = snapshot_path(data_dir, bot_id);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Rewrites the snapshot atomically: the new contents land in a
/// temp file in the same directory, fsynced, then renamed over the
/// live path. A crash mid-write leaves the old snapshot intact rather
/// than a half-written one.
pub fn save(data_dir: &Path, snapshot: &PositionSnapshot) -> Result<(), PositionStoreError> {
    std::fs::create_dir_all(data_dir)?;
    let path = snapshot_path(data_dir, snapshot.bot_id);
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp = NamedTempFile::new_in(data_dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path)?;
    Ok(())
}

/// Deletes the snapshot on full close (spec §4.6: "delete snapshot,
/// transition -> FLAT"). Idempotent: a missing file is not an error.
pub fn delete(data_dir: &Path, bot_id: Uuid) -> Result<(), PositionStoreError> {
    let path = snapshot_path(data_dir, bot_id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn sample(bot_id: Uuid) -> PositionSnapshot {
        PositionSnapshot {
            bot_id,
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(0.001),
            entry_price: dec!(60_000),
            opened_at: Utc::now(),
            max_hold_until: Utc::now(),
            stop_loss_price: dec!(58_200),
            take_profit_price: dec!(63_000),
            initial_investment: dec!(100),
            capital_additions: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let bot_id = Uuid::new_v4();
        let snapshot = sample(bot_id);

        save(dir.path(), &snapshot).unwrap();
        let loaded = load(dir.path(), bot_id).unwrap().unwrap();
        assert_eq!(loaded.entry_price, snapshot.entry_price);
        assert_eq!(loaded.quantity, snapshot.quantity);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let bot_id = Uuid::new_v4();
        save(dir.path(), &sample(bot_id)).unwrap();
        delete(dir.path(), bot_id).unwrap();
        delete(dir.path(), bot_id).unwrap();
        assert!(load(dir.path(), bot_id).unwrap().is_none());
    }
}
