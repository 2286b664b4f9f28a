use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use luna_quotes::bot::Bot;
use luna_quotes::daemon::Recount;
use luna_quotes::irc::{IrcClientErr, irc_runner};
use luna_quotes::quotes::{MemoryQuoteStore, PgQuoteStore, QuoteErr, QuoteStore};
use luna_quotes::store::{CounterStore, MemoryStore, RedisStore, StoreErr};
use luna_quotes::util::env::{self, ConfigErr, StoreBackend};
use luna_quotes::util::telemetry::Telemetry;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigErr),

    #[error(transparent)]
    Store(#[from] StoreErr),

    #[error(transparent)]
    Quote(#[from] QuoteErr),

    #[error(transparent)]
    Irc(#[from] IrcClientErr),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = env::config().await?;
    let telemetry = Telemetry::register(config)?;

    tracing::info!(backend = ?config.store_backend, "starting luna-quotes");

    let counters: Arc<dyn CounterStore> = match config.store_backend {
        StoreBackend::Redis => {
            Arc::new(RedisStore::connect(&config.redis_url, config.store_timeout).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory counters, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let quotes: Arc<dyn QuoteStore> = match &config.database_url {
        Some(url) => Arc::new(PgQuoteStore::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL unset, using in-memory quote archive");
            Arc::new(MemoryQuoteStore::new())
        }
    };

    let bot = Bot::new(counters, quotes.clone())
        .with_command_prefix(config.command_prefix.clone())
        .with_key_prefix(config.key_prefix.clone());

    let (tx_shutdown, rx_shutdown) = watch::channel(false);
    let mut handles = Vec::new();

    let recount = Recount::new(bot.clone(), quotes, config.recount_interval);
    handles.push(tokio::spawn(recount.run(rx_shutdown.clone())));

    match &config.irc {
        Some(settings) => handles.push(irc_runner(settings, bot, rx_shutdown).await?),
        None => tracing::warn!("IRC_SERVER unset, no chat front-end attached"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    _ = tx_shutdown.send(true);
    for res in futures::future::join_all(handles).await {
        if let Err(e) = res {
            tracing::error!(error = ?e, "task ended abnormally");
        }
    }

    telemetry.shutdown();
    Ok(())
}
