use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    model::{
        application::CommandInteraction,
        channel::Message,
        id::{GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::bot::{
    dispatch::{Intent, Requester},
    reply::{ChannelReply, InteractionReply, Reply},
    MusicBot,
};

/// Handles slash commands.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("This command can only be used in a server.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Command /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str());

    let Some(intent) = Intent::from_slash(&command.data.name, query) else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Unknown command")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    let requester = requester_for(ctx, guild_id, command.user.id);
    let announcer = ChannelReply::new(ctx.http.clone(), command.channel_id);
    let reply = InteractionReply::new(ctx.http.clone(), command);

    // Lookups can outlast the interaction's initial response window.
    if matches!(intent, Intent::Play { .. }) {
        reply.defer().await?;
    }

    bot.dispatcher.handle(intent, requester, reply, announcer).await;
    Ok(())
}

/// Handles prefix commands typed in a text channel.
pub async fn handle_message(ctx: &Context, message: Message, bot: &MusicBot) -> Result<()> {
    if message.author.bot {
        return Ok(());
    }

    let Some(intent) = Intent::from_text(&message.content, &bot.config.command_prefix) else {
        return Ok(());
    };

    let Some(guild_id) = message.guild_id else {
        debug!("Ignoring command outside a guild");
        return Ok(());
    };

    info!(
        "📝 Command {:?} used by {} in guild {}",
        intent, message.author.name, guild_id
    );

    let requester = requester_for(ctx, guild_id, message.author.id);
    let reply: std::sync::Arc<dyn Reply> = ChannelReply::new(ctx.http.clone(), message.channel_id);

    bot.dispatcher
        .handle(intent, requester, reply.clone(), reply)
        .await;
    Ok(())
}

/// Reads the requester's voice channel and the bot's permissions there from
/// the cache. Missing member data is treated as permitted; a real refusal
/// then surfaces as a voice link error.
fn requester_for(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Requester {
    let bot_id = ctx.cache.current_user().id;

    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return Requester {
            guild_id,
            voice_channel: None,
            can_join: false,
        };
    };

    let voice_channel = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);

    let can_join = voice_channel
        .and_then(|channel_id| guild.channels.get(&channel_id))
        .and_then(|channel| {
            guild
                .members
                .get(&bot_id)
                .map(|member| guild.user_permissions_in(channel, member))
        })
        .map(|permissions| permissions.connect() && permissions.speak())
        .unwrap_or(true);

    Requester {
        guild_id,
        voice_channel,
        can_join,
    }
}
