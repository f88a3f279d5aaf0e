//! Root binary: wires configuration, the bot registry, the exchange
//! client, the news service, and the position store into a `Supervisor`,
//! then runs either the bare bot fleet (`run`) or the fleet plus the
//! dashboard HTTP server (`serve`).

use anyhow::{Context, Result};
use configuration::cli::{Cli, Commands};
use configuration::load_config;
use core_types::BotConfig;
use exchange_client::BinanceSpotClient;
use news::NewsService;
use notifier::{run_notifier_service, WebhookNotifier};
use position_store::PositionStore;
use std::sync::Arc;
use supervisor::{BotRegistry, DbBotRegistry, FileBotRegistry, Supervisor};

/// Exit codes (spec §6): 0 normal, 1 config error, 2 unrecoverable auth
/// failure surfacing all the way out of bootstrap (e.g. bad exchange
/// credentials rejecting every account call before any bot can run).
#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();

    let cli = <Cli as clap::Parser>::parse();
    let config = match load_config(&cli.config).context("loading config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e:#}");
            return std::process::ExitCode::from(1);
        }
    };

    match run(cli, config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            let is_auth_failure = e
                .chain()
                .any(|cause| cause.to_string().to_lowercase().contains("auth"));
            eprintln!("fatal: {e:#}");
            std::process::ExitCode::from(if is_auth_failure { 2 } else { 1 })
        }
    }
}

async fn run(cli: Cli, config: configuration::Config) -> Result<()> {
    let _log_guard = configuration::init_tracing(&config.logging);

    tracing::info!("vanguard starting up");

    let registry = build_registry(&config).await?;
    let exchange = Arc::new(BinanceSpotClient::new(&config.exchange)) as Arc<dyn exchange_client::ExchangeClient>;
    let news = Arc::new(NewsService::new(&config.news, &config.llm));
    let position_store = PositionStore::new(&config.storage.data_dir);
    let (events_tx, _) = tokio::sync::broadcast::channel(1024);

    if let Some(notifier) = WebhookNotifier::new(&config.notifier) {
        let rx = events_tx.subscribe();
        tokio::spawn(run_notifier_service(notifier, rx));
        tracing::info!("webhook notifier service started");
    }

    let supervisor = Arc::new(
        Supervisor::new(&config, registry, exchange, news, position_store, events_tx)
            .context("building supervisor")?,
    );

    let adopted = supervisor.bootstrap().await.context("supervisor bootstrap")?;
    if !adopted.is_empty() {
        tracing::info!(count = adopted.len(), "adopted orphan positions as stopped bots");
    }
    supervisor.spawn_background_tasks();

    match cli.command {
        Commands::Run => {
            tracing::info!("running headless; dashboard disabled (use `serve` to expose it)");
            // Bots already running from bootstrap keep going on their own
            // spawned tasks; the process just needs to stay alive until
            // the operator interrupts it (spec §6: the supervisor never
            // exits while any bot is running).
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            tracing::info!("received shutdown signal, exiting");
        }
        Commands::Serve { addr } => {
            let addr = addr.parse().context("parsing --addr")?;
            web_server::run_server(addr, supervisor).await?;
        }
    }

    Ok(())
}

/// Selects the bot-config registry backend: Postgres when
/// `storage.database_url` is configured, otherwise a flat `bots.toml`
/// file under the data directory (spec §6: the encoding is not the
/// contract, the schema is).
async fn build_registry(config: &configuration::Config) -> Result<Arc<dyn BotRegistry>> {
    if let Some(database_url) = &config.storage.database_url {
        std::env::set_var("DATABASE_URL", database_url);
        let pool = database::connect().await.context("connecting to database")?;
        database::run_migrations(&pool).await.context("running database migrations")?;
        let repo = database::DbRepository::new(pool);
        Ok(Arc::new(DbBotRegistry::new(repo)))
    } else {
        let path = format!("{}/bots.toml", config.storage.data_dir);
        std::fs::create_dir_all(&config.storage.data_dir).context("creating data directory")?;
        let initial: Vec<BotConfig> = configuration::load_bots_file(&path).context("loading bots.toml")?;
        Ok(Arc::new(FileBotRegistry::new(path, initial)))
    }
}
