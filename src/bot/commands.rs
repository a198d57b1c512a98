use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers the commands globally (propagation can take up to an hour).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands for a single guild (development, instant).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        queue_command(),
        pause_command(),
        resume_command(),
    ]
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Search query or YouTube URL",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current queue")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the playback")
}
