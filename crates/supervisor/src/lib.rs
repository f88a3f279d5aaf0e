//! The bot supervisor (spec C7): owns the bot-config registry, spawns
//! and stops one `trading-loop` task per running bot, detects crashes
//! without auto-restarting them, and sweeps for orphaned exchange
//! balances on start. This is the one component every dashboard
//! request and the root binary's CLI both go through.

pub mod error;
pub mod orphan;
pub mod registry;

pub use error::SupervisorError;
pub use registry::{BotRegistry, DbBotRegistry, FileBotRegistry};

use accounting::AllocationAccountant;
use chrono::Utc;
use configuration::Config;
use core_types::{BotConfig, BotRunState};
use events::BotEvent;
use exchange_client::ExchangeClient;
use news::NewsService;
use position_store::PositionStore;
use risk::RiskParams;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use strategies::create_strategy;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use trading_loop::{crash_event, BotExit, BotLoop};
use uuid::Uuid;

/// Fields editable only while a bot is stopped (spec §6 PATCH rule).
const LOCKED_WHILE_RUNNING: &[&str] = &["symbol", "strategy", "allocated"];

/// How many recent `BotEvent`s are retained per bot for the dashboard's
/// "last N log lines" view (spec §4.7.5).
const RECENT_EVENTS_CAP: usize = 200;

/// How often the background reaper sweeps for tasks that exited
/// without going through `stop()` (spec §4.7.3: crash detection).
const REAP_INTERVAL: Duration = Duration::from_secs(5);

struct RunningBot {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<BotExit>,
}

/// Everything needed to spawn a bot's own `trading-loop` task, shared
/// across every bot rather than rebuilt per spawn.
struct LoopDeps {
    exchange: Arc<dyn ExchangeClient>,
    news: Arc<NewsService>,
    position_store: PositionStore,
    risk_defaults: RiskParams,
    cycle_interval: Duration,
}

/// The C7 bot supervisor. One instance per process, shared behind an
/// `Arc` by the root binary with the dashboard and the notifier.
pub struct Supervisor {
    registry: Arc<dyn BotRegistry>,
    deps: LoopDeps,
    drain_cap: Duration,
    min_notional: Decimal,
    events_tx: broadcast::Sender<BotEvent>,
    running: Mutex<HashMap<Uuid, RunningBot>>,
    recent_events: Mutex<HashMap<Uuid, VecDeque<BotEvent>>>,
}

/// The fields a caller supplies to create a new bot (spec §6
/// `POST /api/bot`).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewBotRequest {
    pub name: String,
    pub symbol: String,
    pub strategy: core_types::StrategyKind,
    #[serde(default = "serde_json::Value::default")]
    pub strategy_params: serde_json::Value,
    pub allocated: Decimal,
}

/// A partial edit to an existing bot (spec §6 `PATCH /api/bot/{id}`).
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BotEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub strategy: Option<core_types::StrategyKind>,
    #[serde(default)]
    pub strategy_params: Option<serde_json::Value>,
    #[serde(default)]
    pub allocated: Option<Decimal>,
}

/// The dashboard's per-bot detail view (spec §6 `GET /api/bot/{id}`):
/// config, durable position snapshot, recent trades, and recent
/// structured log events.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BotDetail {
    pub config: BotConfig,
    pub position: Option<core_types::PositionSnapshot>,
    pub recent_trades: Vec<core_types::TradeLogEntry>,
    pub recent_events: Vec<BotEvent>,
}

/// The dashboard's fleet-wide summary (spec §6 `GET /api/overview`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Overview {
    pub bots: Vec<BotConfig>,
    pub usdt_free: Decimal,
    pub total_allocated: Decimal,
    pub available_for_allocation: Decimal,
}

impl Supervisor {
    /// Builds the supervisor. Does not spawn anything yet — call
    /// [`Supervisor::bootstrap`] once, then `start`/`stop` per bot.
    pub fn new(
        config: &Config,
        registry: Arc<dyn BotRegistry>,
        exchange: Arc<dyn ExchangeClient>,
        news: Arc<NewsService>,
        position_store: PositionStore,
        events_tx: broadcast::Sender<BotEvent>,
    ) -> Result<Self, SupervisorError> {
        let risk_defaults = RiskParams::from_defaults(&config.risk_defaults)?;

        Ok(Self {
            registry,
            deps: LoopDeps {
                exchange,
                news,
                position_store,
                risk_defaults,
                cycle_interval: Duration::from_secs(config.risk_defaults.check_interval_secs),
            },
            drain_cap: Duration::from_secs(config.supervisor.drain_cap_secs),
            min_notional: config.supervisor.min_notional,
            events_tx,
            running: Mutex::new(HashMap::new()),
            recent_events: Mutex::new(HashMap::new()),
        })
    }

    /// Runs once at process start (spec §4.7.4): sweeps for orphaned
    /// exchange balances and adopts them as stopped bots, then starts
    /// every bot the registry already has marked `running` (surviving
    /// a restart resumes it; `crashed` bots stay crashed until the
    /// operator explicitly restarts them).
    pub async fn bootstrap(&self) -> Result<Vec<BotConfig>, SupervisorError> {
        let adopted = orphan::detect_and_adopt(
            self.registry.as_ref(),
            self.deps.exchange.as_ref(),
            &self.deps.position_store,
            &self.deps.risk_defaults,
            self.min_notional,
        )
        .await?;

        for config in &adopted {
            tracing::info!(bot_id = %config.bot_id, symbol = %config.symbol, "adopted orphan position");
            let _ = self.events_tx.send(BotEvent::OrphanAdopted(events::OrphanAdoptedEvent {
                bot_id: config.bot_id,
                timestamp: Utc::now(),
                symbol: config.symbol.clone(),
                estimated_value: config.allocated,
            }));
        }

        let previously_running: Vec<Uuid> = self
            .registry
            .list_bots()
            .await?
            .into_iter()
            .filter(|b| b.state == BotRunState::Running)
            .map(|b| b.bot_id)
            .collect();

        for bot_id in previously_running {
            if let Err(e) = self.start(bot_id).await {
                tracing::warn!(bot_id = %bot_id, error = %e, "failed to resume previously-running bot");
            }
        }

        Ok(adopted)
    }

    /// Removes finished `JoinHandle`s from the running set, recording
    /// a crash for any that exited without going through `stop()`.
    async fn reap(&self) {
        let finished: Vec<Uuid> = {
            let running = self.running.lock().await;
            running
                .iter()
                .filter(|(_, rb)| rb.handle.is_finished())
                .map(|(id, _)| *id)
                .collect()
        };

        for bot_id in finished {
            let running_bot = {
                let mut running = self.running.lock().await;
                running.remove(&bot_id)
            };
            let Some(running_bot) = running_bot else { continue };

            match running_bot.handle.await {
                Ok(BotExit::Stopped) => {
                    // Raced with a concurrent `stop()`; that call path
                    // already updates the registry, nothing to do here.
                }
                Ok(BotExit::Halted(last_error)) => {
                    self.record_crash(bot_id, last_error).await;
                }
                Err(join_err) => {
                    self.record_crash(bot_id, format!("task panicked: {join_err}")).await;
                }
            }
        }
    }

    async fn record_crash(&self, bot_id: Uuid, last_error: String) {
        tracing::error!(bot_id = %bot_id, error = %last_error, "bot crashed, not auto-restarting");
        if let Err(e) = self
            .registry
            .update_run_state(bot_id, BotRunState::Crashed, Utc::now())
            .await
        {
            tracing::warn!(bot_id = %bot_id, error = %e, "failed to persist crashed state");
        }
        let event = crash_event(bot_id, last_error);
        self.remember_event(bot_id, event.clone()).await;
        let _ = self.events_tx.send(event);
    }

    async fn remember_event(&self, bot_id: Uuid, event: BotEvent) {
        let mut recent = self.recent_events.lock().await;
        let deque = recent.entry(bot_id).or_default();
        deque.push_back(event);
        while deque.len() > RECENT_EVENTS_CAP {
            deque.pop_front();
        }
    }

    /// Spawns the background reaper task (crash detection, spec
    /// §4.7.3) and the event-history collector (spec §4.7.5). Intended
    /// to be called once by the root binary after `bootstrap`.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let reaper = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAP_INTERVAL).await;
                reaper.reap().await;
            }
        });

        let collector = Arc::clone(self);
        let mut events_rx = self.events_tx.subscribe();
        tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => collector.remember_event(event.bot_id(), event).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub async fn list_bots(&self) -> Result<Vec<BotConfig>, SupervisorError> {
        self.reap().await;
        self.registry.list_bots().await
    }

    pub async fn overview(&self) -> Result<Overview, SupervisorError> {
        self.reap().await;
        let bots = self.registry.list_bots().await?;
        let usdt_free = self.deps.exchange.get_balance("USDT").await?.free;
        let accountant = AllocationAccountant::new(usdt_free, &bots);
        Ok(Overview {
            bots,
            usdt_free: accountant.usdt_free(),
            total_allocated: accountant.total_allocated(),
            available_for_allocation: accountant.available_for_allocation(),
        })
    }

    pub async fn bot_detail(&self, bot_id: Uuid) -> Result<BotDetail, SupervisorError> {
        self.reap().await;
        let config = self.registry.get_bot(bot_id).await?;
        let position = self.deps.position_store.load(bot_id)?;
        let recent_trades = self.deps.position_store.tail_trades(bot_id, 50)?;
        let recent_events = self
            .recent_events
            .lock()
            .await
            .get(&bot_id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();

        Ok(BotDetail {
            config,
            position,
            recent_trades,
            recent_events,
        })
    }

    /// Creates a new, stopped bot (spec §6 `POST /api/bot`), validating
    /// its requested allocation against the shared cash pool first.
    pub async fn create_bot(&self, req: NewBotRequest) -> Result<BotConfig, SupervisorError> {
        let bots = self.registry.list_bots().await?;
        let usdt_free = self.deps.exchange.get_balance("USDT").await?.free;
        let accountant = AllocationAccountant::new(usdt_free, &bots);
        accountant.check_allocation(req.allocated)?;

        let now = Utc::now();
        let config = BotConfig {
            bot_id: Uuid::new_v4(),
            name: req.name,
            symbol: req.symbol,
            strategy: req.strategy,
            strategy_params: req.strategy_params,
            allocated: req.allocated,
            state: BotRunState::Stopped,
            has_traded: false,
            orphan_adopted: false,
            adopted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.registry.insert_bot(&config).await?;
        Ok(config)
    }

    /// Applies a partial edit (spec §6 `PATCH /api/bot/{id}`). Editing
    /// `symbol`/`strategy`/`allocated` is rejected unless the bot is
    /// stopped; `name`/`strategy_params` may change at any time.
    pub async fn update_bot(&self, bot_id: Uuid, edit: BotEdit) -> Result<BotConfig, SupervisorError> {
        self.reap().await;
        let mut config = self.registry.get_bot(bot_id).await?;
        let is_running = config.state != BotRunState::Stopped;

        if is_running {
            if edit.symbol.as_ref().is_some_and(|s| *s != config.symbol) {
                return Err(SupervisorError::EditWhileRunning { bot_id, field: LOCKED_WHILE_RUNNING[0] });
            }
            if edit.strategy.as_ref().is_some_and(|s| *s != config.strategy) {
                return Err(SupervisorError::EditWhileRunning { bot_id, field: LOCKED_WHILE_RUNNING[1] });
            }
            if edit.allocated.as_ref().is_some_and(|a| *a != config.allocated) {
                return Err(SupervisorError::EditWhileRunning { bot_id, field: LOCKED_WHILE_RUNNING[2] });
            }
        }

        if let Some(allocated) = edit.allocated {
            if allocated != config.allocated {
                let bots = self.registry.list_bots().await?;
                let usdt_free = self.deps.exchange.get_balance("USDT").await?.free;
                let mut accountant = AllocationAccountant::new(usdt_free, &bots);
                accountant.release_allocation(config.allocated);
                accountant.check_allocation(allocated)?;
            }
            config.allocated = allocated;
        }
        if let Some(name) = edit.name {
            config.name = name;
        }
        if let Some(symbol) = edit.symbol {
            config.symbol = symbol;
        }
        if let Some(strategy) = edit.strategy {
            config.strategy = strategy;
        }
        if let Some(params) = edit.strategy_params {
            config.strategy_params = params;
        }
        config.updated_at = Utc::now();

        self.registry.update_bot(&config).await?;
        Ok(config)
    }

    /// Adds operator funds to a bot (spec §6 `POST /api/bot/{id}/add-funds`).
    /// While a position is open the addition is recorded on the durable
    /// snapshot's `capital_additions` (spec §6 wire format); while flat
    /// there is no snapshot to append to, so the addition instead raises
    /// the bot's `allocated` ceiling for its next entry. Either way C8
    /// re-checks the shared pool first.
    pub async fn add_funds(&self, bot_id: Uuid, amount: Decimal) -> Result<BotConfig, SupervisorError> {
        let mut config = self.registry.get_bot(bot_id).await?;
        let bots = self.registry.list_bots().await?;
        let usdt_free = self.deps.exchange.get_balance("USDT").await?.free;
        let accountant = AllocationAccountant::new(usdt_free, &bots);
        accountant.check_allocation(amount)?;

        match self.deps.position_store.load(bot_id)? {
            Some(mut position) => {
                position.capital_additions.push(core_types::CapitalAddition {
                    bot_id,
                    amount,
                    added_at: Utc::now(),
                });
                position.last_updated = Utc::now();
                self.deps.position_store.save(&position)?;
            }
            None => {
                config.allocated += amount;
            }
        }

        config.updated_at = Utc::now();
        self.registry.update_bot(&config).await?;
        Ok(config)
    }

    /// Deletes a bot (spec §6 `DELETE /api/bot/{id}`), allowed only
    /// when stopped and flat.
    pub async fn delete_bot(&self, bot_id: Uuid) -> Result<(), SupervisorError> {
        self.reap().await;
        let config = self.registry.get_bot(bot_id).await?;
        if config.state != BotRunState::Stopped || self.deps.position_store.load(bot_id)?.is_some() {
            return Err(SupervisorError::NotStoppedAndFlat(bot_id));
        }
        self.registry.delete_bot(bot_id).await?;
        self.recent_events.lock().await.remove(&bot_id);
        Ok(())
    }

    /// Spawns a fresh trading-loop task for `bot_id` (spec §6
    /// `POST /api/bot/{id}/start`).
    pub async fn start(&self, bot_id: Uuid) -> Result<(), SupervisorError> {
        self.reap().await;

        if self.running.lock().await.contains_key(&bot_id) {
            return Err(SupervisorError::AlreadyRunning(bot_id));
        }

        let config = self.registry.get_bot(bot_id).await?;
        let strategy = create_strategy(config.strategy, Arc::clone(&self.deps.news), Arc::clone(&self.deps.exchange));

        let bot_loop = BotLoop::new(
            bot_id,
            config.symbol.clone(),
            config.allocated,
            config.has_traded,
            strategy,
            Arc::clone(&self.deps.exchange),
            Arc::clone(&self.deps.news),
            self.deps.position_store.clone(),
            self.deps.risk_defaults,
            self.deps.cycle_interval,
            self.events_tx.clone(),
        )
        .map_err(|e| SupervisorError::TradingLoop { bot_id, source: e.to_string() })?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(bot_loop.run(cancel_rx));

        self.running.lock().await.insert(bot_id, RunningBot { cancel: cancel_tx, handle });
        self.registry.update_run_state(bot_id, BotRunState::Running, Utc::now()).await?;
        tracing::info!(bot_id = %bot_id, symbol = %config.symbol, "bot started");
        Ok(())
    }

    /// Requests cooperative shutdown of a running bot (spec §4.7.2):
    /// waits up to the configured drain cap for the loop to flush its
    /// snapshot and exit; past that, the task is aborted and the bot
    /// is marked stopped regardless.
    pub async fn stop(&self, bot_id: Uuid) -> Result<(), SupervisorError> {
        let running_bot = {
            let mut running = self.running.lock().await;
            running.remove(&bot_id)
        };
        let Some(running_bot) = running_bot else {
            return Err(SupervisorError::NotRunning(bot_id));
        };

        let _ = running_bot.cancel.send(true);
        let abort_handle = running_bot.handle.abort_handle();

        match tokio::time::timeout(self.drain_cap, running_bot.handle).await {
            Ok(Ok(_exit)) => {
                tracing::info!(bot_id = %bot_id, "bot stopped cleanly");
            }
            Ok(Err(join_err)) => {
                tracing::warn!(bot_id = %bot_id, error = %join_err, "bot task panicked during stop");
            }
            Err(_timeout) => {
                abort_handle.abort();
                tracing::warn!(bot_id = %bot_id, "bot did not drain within the cap, abandoning task");
            }
        }

        self.registry.update_run_state(bot_id, BotRunState::Stopped, Utc::now()).await?;
        Ok(())
    }
}
