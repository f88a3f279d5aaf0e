//! The bot-config registry (spec §6, §4.7.1): CRUD over `BotConfig`,
//! backed by either Postgres (`database::DbRepository`) or a flat
//! `bots.toml` file, selected by whether `storage.database_url` is
//! configured. The supervisor treats both as interchangeable sources
//! of truth behind the `BotRegistry` trait.

use crate::error::SupervisorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{BotConfig, BotRunState};
use database::DbRepository;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait BotRegistry: Send + Sync {
    async fn list_bots(&self) -> Result<Vec<BotConfig>, SupervisorError>;
    async fn get_bot(&self, bot_id: Uuid) -> Result<BotConfig, SupervisorError>;
    async fn insert_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError>;
    async fn update_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError>;
    async fn update_run_state(
        &self,
        bot_id: Uuid,
        state: BotRunState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SupervisorError>;
    async fn delete_bot(&self, bot_id: Uuid) -> Result<(), SupervisorError>;
}

/// Postgres-backed registry, a thin pass-through to `DbRepository`.
pub struct DbBotRegistry {
    repo: DbRepository,
}

impl DbBotRegistry {
    pub fn new(repo: DbRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl BotRegistry for DbBotRegistry {
    async fn list_bots(&self) -> Result<Vec<BotConfig>, SupervisorError> {
        Ok(self.repo.list_bots().await?)
    }

    async fn get_bot(&self, bot_id: Uuid) -> Result<BotConfig, SupervisorError> {
        self.repo
            .get_bot(bot_id)
            .await
            .map_err(|e| match e {
                database::DbError::NotFound => SupervisorError::NotFound(bot_id),
                other => other.into(),
            })
    }

    async fn insert_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError> {
        Ok(self.repo.insert_bot(bot).await?)
    }

    async fn update_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError> {
        self.repo.update_bot(bot).await.map_err(|e| match e {
            database::DbError::NotFound => SupervisorError::NotFound(bot.bot_id),
            other => other.into(),
        })
    }

    async fn update_run_state(
        &self,
        bot_id: Uuid,
        state: BotRunState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SupervisorError> {
        self.repo
            .update_run_state(bot_id, state, updated_at)
            .await
            .map_err(|e| match e {
                database::DbError::NotFound => SupervisorError::NotFound(bot_id),
                other => other.into(),
            })
    }

    async fn delete_bot(&self, bot_id: Uuid) -> Result<(), SupervisorError> {
        self.repo.delete_bot(bot_id).await.map_err(|e| match e {
            database::DbError::NotFound => SupervisorError::NotFound(bot_id),
            other => other.into(),
        })
    }
}

#[derive(Serialize, Deserialize, Default)]
struct BotsFileShape {
    #[serde(default)]
    bots: Vec<BotConfig>,
}

/// Flat-file registry for deployments without a configured
/// `DATABASE_URL`. Guarded by a single mutex around every CRUD
/// operation (spec §5: "the supervisor's bot registry is guarded by a
/// single mutex"), rewritten atomically the same write-temp-then-rename
/// way `position-store` persists snapshots.
pub struct FileBotRegistry {
    path: PathBuf,
    bots: Mutex<Vec<BotConfig>>,
}

impl FileBotRegistry {
    pub fn new(path: impl Into<PathBuf>, initial: Vec<BotConfig>) -> Self {
        Self {
            path: path.into(),
            bots: Mutex::new(initial),
        }
    }

    fn persist(path: &Path, bots: &[BotConfig]) -> Result<(), SupervisorError> {
        let shape = BotsFileShape { bots: bots.to_vec() };
        let rendered = toml::to_string_pretty(&shape)
            .map_err(|e| SupervisorError::Registry(format!("serializing bots.toml: {e}")))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SupervisorError::Registry(format!("creating {parent:?}: {e}")))?;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| SupervisorError::Registry(format!("creating temp file: {e}")))?;
        tmp.write_all(rendered.as_bytes())
            .map_err(|e| SupervisorError::Registry(format!("writing temp file: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| SupervisorError::Registry(format!("fsyncing temp file: {e}")))?;
        tmp.persist(path)
            .map_err(|e| SupervisorError::Registry(format!("renaming into place: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl BotRegistry for FileBotRegistry {
    async fn list_bots(&self) -> Result<Vec<BotConfig>, SupervisorError> {
        Ok(self.bots.lock().await.clone())
    }

    async fn get_bot(&self, bot_id: Uuid) -> Result<BotConfig, SupervisorError> {
        self.bots
            .lock()
            .await
            .iter()
            .find(|b| b.bot_id == bot_id)
            .cloned()
            .ok_or(SupervisorError::NotFound(bot_id))
    }

    async fn insert_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError> {
        let mut bots = self.bots.lock().await;
        bots.push(bot.clone());
        Self::persist(&self.path, &bots)
    }

    async fn update_bot(&self, bot: &BotConfig) -> Result<(), SupervisorError> {
        let mut bots = self.bots.lock().await;
        let slot = bots
            .iter_mut()
            .find(|b| b.bot_id == bot.bot_id)
            .ok_or(SupervisorError::NotFound(bot.bot_id))?;
        *slot = bot.clone();
        Self::persist(&self.path, &bots)
    }

    async fn update_run_state(
        &self,
        bot_id: Uuid,
        state: BotRunState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SupervisorError> {
        let mut bots = self.bots.lock().await;
        let slot = bots
            .iter_mut()
            .find(|b| b.bot_id == bot_id)
            .ok_or(SupervisorError::NotFound(bot_id))?;
        slot.state = state;
        slot.updated_at = updated_at;
        Self::persist(&self.path, &bots)
    }

    async fn delete_bot(&self, bot_id: Uuid) -> Result<(), SupervisorError> {
        let mut bots = self.bots.lock().await;
        let before = bots.len();
        bots.retain(|b| b.bot_id != bot_id);
        if bots.len() == before {
            return Err(SupervisorError::NotFound(bot_id));
        }
        Self::persist(&self.path, &bots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::StrategyKind;
    use rust_decimal_macros::dec;

    fn bot(name: &str) -> BotConfig {
        let now = Utc::now();
        BotConfig {
            bot_id: Uuid::new_v4(),
            name: name.to_string(),
            symbol: "BTCUSDT".to_string(),
            strategy: StrategyKind::Technical,
            strategy_params: serde_json::json!({}),
            allocated: dec!(100),
            state: BotRunState::Stopped,
            has_traded: false,
            orphan_adopted: false,
            adopted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), Vec::new());
        let b = bot("alpha");
        registry.insert_bot(&b).await.unwrap();

        let listed = registry.list_bots().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].bot_id, b.bot_id);
        assert!(dir.path().join("bots.toml").exists());
    }

    #[tokio::test]
    async fn get_missing_bot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), Vec::new());
        let err = registry.get_bot(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_bot_persists_the_edit() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = bot("alpha");
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), vec![b.clone()]);

        b.allocated = dec!(250);
        registry.update_bot(&b).await.unwrap();

        let fetched = registry.get_bot(b.bot_id).await.unwrap();
        assert_eq!(fetched.allocated, dec!(250));
    }

    #[tokio::test]
    async fn update_run_state_changes_state_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let b = bot("alpha");
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), vec![b.clone()]);

        let new_ts = Utc::now();
        registry.update_run_state(b.bot_id, BotRunState::Running, new_ts).await.unwrap();

        let fetched = registry.get_bot(b.bot_id).await.unwrap();
        assert_eq!(fetched.state, BotRunState::Running);
        assert_eq!(fetched.updated_at, new_ts);
    }

    #[tokio::test]
    async fn delete_bot_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let b = bot("alpha");
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), vec![b.clone()]);

        registry.delete_bot(b.bot_id).await.unwrap();
        assert!(registry.list_bots().await.unwrap().is_empty());
        assert!(matches!(registry.delete_bot(b.bot_id).await.unwrap_err(), SupervisorError::NotFound(_)));
    }
}
