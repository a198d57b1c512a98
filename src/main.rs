use anyhow::{Context, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod voice;

use crate::audio::player::GuildPlayers;
use crate::bot::{dispatch::CommandDispatcher, MusicBot};
use crate::config::Config;
use crate::sources::SongbirdSource;
use crate::voice::SongbirdConnector;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_queue_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting voice queue bot v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Arc::new(Config::load().context("failed to load configuration")?);
    info!("{}", config.summary());

    let backoff = Duration::from_secs(config.restart_backoff_secs);

    loop {
        tokio::select! {
            result = run_bot(config.clone()) => {
                match result {
                    Ok(()) => error!("Client stopped unexpectedly"),
                    Err(e) => error!("Client error: {:?}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Shutdown signal received, exiting");
                return Ok(());
            }
        }

        info!("🔄 Restarting in {}s", backoff.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Shutdown signal received, exiting");
                return Ok(());
            }
        }
    }
}

/// Builds a fresh client with its own voice manager and per-guild players,
/// and runs it until the gateway connection ends.
async fn run_bot(config: Arc<Config>) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(songbird.clone()));
    let source = Arc::new(SongbirdSource::new(reqwest::Client::new()));
    let players = Arc::new(GuildPlayers::new(
        connector,
        source,
        config.max_queue_size,
    ));

    let resolver = sources::resolver_from_config(&config)?;

    let dispatcher = Arc::new(CommandDispatcher::new(players.clone(), resolver));
    let handler = MusicBot::new(config.clone(), dispatcher, players);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("failed to build Discord client")?;

    info!("🚀 Bot started");
    client.start().await?;

    Ok(())
}

async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await
        .context("yt-dlp not found")?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp is not working");
    }
}
