use crate::error::ConfigError;
use crate::settings::Config;

// Declare the modules that make up this crate.
pub mod bots_file;
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use bots_file::load_bots_file;
pub use settings::{
    Config, ExchangeConfig, LlmConfig, LoggingConfig, NewsConfig, NotifierConfig, RiskDefaults,
    StorageConfig, SupervisorConfig,
};

#[cfg(feature = "clap")]
pub mod cli {
    use clap::{Parser, Subcommand};

    /// The vanguard trading bot fleet.
    #[derive(Debug, Parser)]
    #[command(name = "vanguard", version, about)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Commands,

        /// Path to the config.toml file.
        #[arg(long, default_value = "config.toml")]
        pub config: String,
    }

    #[derive(Debug, Subcommand)]
    pub enum Commands {
        /// Run the supervisor and all enabled bots.
        Run,
        /// Run the supervisor plus the dashboard HTTP server.
        Serve {
            #[arg(long, default_value = "0.0.0.0:8080")]
            addr: String,
        },
    }
}

/// Loads the application configuration from a TOML file, then layers
/// environment variables from the §6 table on top.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .set_override_option("exchange.api_key", std::env::var("EXCHANGE_API_KEY").ok())?
        .set_override_option(
            "exchange.api_secret",
            std::env::var("EXCHANGE_API_SECRET").ok(),
        )?
        .set_override_option(
            "exchange.use_testnet",
            std::env::var("USE_TESTNET")
                .ok()
                .map(|v| v == "true" || v == "1"),
        )?
        .set_override_option("llm.api_key", std::env::var("LLM_API_KEY").ok())?
        .set_override_option("news.api_key", std::env::var("NEWS_API_KEY").ok())?
        .set_override_option(
            "risk_defaults.check_interval_secs",
            std::env::var("CHECK_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok()),
        )?
        .set_override_option(
            "risk_defaults.stop_loss_pct",
            std::env::var("DEFAULT_SL_PCT").ok(),
        )?
        .set_override_option(
            "risk_defaults.take_profit_pct",
            std::env::var("DEFAULT_TP_PCT").ok(),
        )?
        .set_override_option(
            "risk_defaults.min_confidence",
            std::env::var("MIN_CONFIDENCE").ok(),
        )?
        .set_override_option(
            "notifier.webhook_url",
            std::env::var("NOTIFIER_WEBHOOK_URL").ok(),
        )?
        .set_override_option("storage.data_dir", std::env::var("DATA_DIR").ok())?
        .set_override_option(
            "storage.database_url",
            std::env::var("DATABASE_URL").ok(),
        )?
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    Ok(config)
}

/// Initialises the global `tracing` subscriber: stdout plus an optional
/// rolling file appender, controlled by `RUST_LOG`/`LoggingConfig`.
pub fn init_tracing(
    logging: &LoggingConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(dir) = &logging.file_directory {
        let prefix = logging
            .file_prefix
            .clone()
            .unwrap_or_else(|| "vanguard".to_string());
        let file_appender = tracing_appender::rolling::daily(dir, prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        fmt()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .init();
        Some(guard)
    } else {
        fmt().with_env_filter(env_filter).init();
        None
    }
}
