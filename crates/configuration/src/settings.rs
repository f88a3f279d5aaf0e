use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub risk_defaults: RiskDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Exchange credentials and endpoint selection (C1, §6 env keys).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub use_testnet: bool,
}

/// News provider credentials (C3).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NewsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_news_refresh_secs")]
    pub refresh_interval_secs: u64,
}

fn default_news_refresh_secs() -> u64 {
    3600
}

/// LLM analyser credentials (C3).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Default risk parameters (spec §4.4), overridable by dynamic adjustment per cycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskDefaults {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub min_confidence: Decimal,
    pub max_hold_hours: i64,
    pub check_interval_secs: u64,
    pub reset_hold_on_add: bool,
}

impl Default for RiskDefaults {
    fn default() -> Self {
        Self {
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.05),
            min_confidence: dec!(0.70),
            max_hold_hours: 24,
            check_interval_secs: 900,
            reset_hold_on_add: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_directory: Option<String>,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_drain_cap_secs")]
    pub drain_cap_secs: u64,
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,
}

fn default_drain_cap_secs() -> u64 {
    10
}

fn default_min_notional() -> Decimal {
    dec!(10)
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            drain_cap_secs: default_drain_cap_secs(),
            min_notional: default_min_notional(),
        }
    }
}

/// Where position snapshots, the append-only trade log, and (when not
/// using postgres) the bot-config registry live on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
        }
    }
}
