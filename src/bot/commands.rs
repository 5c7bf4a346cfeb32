use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    http::Http,
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
};

pub const PLAY: &str = "play";
pub const STOP: &str = "stop";

fn music_commands() -> Vec<CreateCommand> {
    vec![play_command(), stop_command()]
}

/// Registra comandos globales
pub async fn register_global_commands(http: &Http) -> Result<()> {
    Command::set_global_commands(http, music_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(http: &Http, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(http, music_commands()).await?;
    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new(PLAY)
        .description("Play a song by name or URL")
        .dm_permission(false)
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Song name or URL")
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new(STOP)
        .description("Stop playback and clear queue (same VC only)")
        .dm_permission(false)
}
