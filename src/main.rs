mod bot;
mod commands;
mod config;
mod event;
mod platform;
mod router;
mod storage;
mod suggest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::EventLoop;
use crate::config::Config;
use crate::platform::telegram::TelegramTransport;
use crate::router::Router;
use crate::storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fcbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let storage = Storage::open(&config.storage.database_path)?;

    let bot = Bot::new(&config.telegram.bot_token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));

    let mut router = Router::new(Arc::new(storage), transport.clone());
    commands::register(&mut router);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let event_loop = EventLoop::new(
        router,
        transport,
        commands::HELP_INLINE_QUERY,
        commands::inline_help,
    );
    let consumer = tokio::spawn(event_loop.run(rx));

    // The poller owns the only sender; when it stops, the consumer drains the
    // remaining updates and exits.
    info!("Bot is starting...");
    platform::telegram::run(bot, tx).await?;

    consumer.await.context("Event loop task panicked")?;
    Ok(())
}
