//! # Bot Module
//!
//! Discord glue for the voice queue bot: command registration, the serenity
//! [`EventHandler`], and translation of slash and prefix commands into
//! [`dispatch::Intent`]s.
//!
//! Playback itself lives in [`crate::audio`]; nothing here touches a queue
//! or a voice connection directly.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod dispatch;
pub mod handlers;
pub mod reply;

use crate::{
    audio::player::GuildPlayers, bot::dispatch::CommandDispatcher, config::Config,
    voice::SongbirdConnector,
};

pub struct MusicBot {
    config: Arc<Config>,
    dispatcher: Arc<CommandDispatcher<SongbirdConnector>>,
    players: Arc<GuildPlayers<SongbirdConnector>>,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<CommandDispatcher<SongbirdConnector>>,
        players: Arc<GuildPlayers<SongbirdConnector>>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            players,
        }
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant)
    /// and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering commands for guild {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}", guild_id);
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                info!("🌍 Registering global commands");
                commands::register_global_commands(ctx).await?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        if let Err(e) = handlers::handle_message(&ctx, message, self).await {
            error!("Error handling message: {:?}", e);
        }
    }

    /// The bot being moved out of voice (kicked, channel deleted) leaves the
    /// engine Playing against a dead link; drop back to Idle so the next
    /// `play` reconnects. A leave that is only delivered after a new session
    /// joined finds that session's link connected and changes nothing.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot disconnected from voice in guild {}", guild_id);
        if let Some(engine) = self.players.get(guild_id) {
            engine.link_lost().await;
        }
    }
}
