use crate::error::PositionStoreError;
use core_types::TradeLogEntry;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn trade_log_path(data_dir: &Path, bot_id: Uuid) -> PathBuf {
    data_dir.join(format!("{bot_id}.trades.log"))
}

/// Appends one immutable line to the bot's trade log (spec §6: "UTC
/// ts, bot_id, BUY|SELL, symbol, price, qty, quote, realised_pnl,
/// reason tag"). Never rewritten or reordered; ordering within one
/// bot's file is the cycle loop's total order.
pub fn append(data_dir: &Path, entry: &TradeLogEntry) -> Result<(), PositionStoreError> {
    std::fs::create_dir_all(data_dir)?;
    let path = trade_log_path(data_dir, entry.bot_id);
    let line = serde_json::to_string(entry)?;

    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads the most recent `limit` trade log entries for a bot, oldest
/// first. An empty or missing log yields an empty vector.
pub fn tail(data_dir: &Path, bot_id: Uuid, limit: usize) -> Result<Vec<TradeLogEntry>, PositionStoreError> {
    let path = trade_log_path(data_dir, bot_id);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(&path)?;
    let mut entries: Vec<TradeLogEntry> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    if entries.len() > limit {
        let drop = entries.len() - limit;
        entries.drain(0..drop);
    }
    Ok(entries)
}
