use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::application::{CommandInteraction, ComponentInteraction, Interaction},
    prelude::Context,
};
use tracing::{debug, warn};

use super::commands;
use crate::{
    audio::service::{MusicService, VoiceRefusal},
    ui::buttons::PanelAction,
};

fn deferred_ephemeral() -> CreateInteractionResponse {
    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true))
}

fn not_ready_response() -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(VoiceRefusal::MusicDisabled.to_string())
            .ephemeral(true),
    )
}

/// Responde a una interacción que llegó antes de `ready`.
pub async fn handle_not_ready(ctx: &Context, interaction: &Interaction) -> Result<()> {
    match interaction {
        Interaction::Command(command) => {
            command.create_response(&ctx.http, not_ready_response()).await?
        }
        Interaction::Component(component) => {
            component.create_response(&ctx.http, not_ready_response()).await?
        }
        _ => {}
    }
    Ok(())
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    service: &MusicService,
) -> Result<()> {
    command.create_response(&ctx.http, deferred_ephemeral()).await?;

    let reply = match command.guild_id {
        None => "Guild only.".to_string(),
        Some(guild_id) => match command.data.name.as_str() {
            commands::PLAY => {
                let query = command
                    .data
                    .options
                    .iter()
                    .find(|option| option.name == "query")
                    .and_then(|option| option.value.as_str())
                    .unwrap_or_default();
                debug!("🎵 /play '{}' de {} en guild {}", query, command.user.id, guild_id);
                service
                    .play(guild_id, Some(command.channel_id), command.user.id, query)
                    .await
            }
            commands::STOP => service.stop_command(guild_id, command.user.id).await,
            other => {
                warn!("Comando desconocido: {}", other);
                "Unknown command.".to_string()
            }
        },
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await?;

    Ok(())
}

/// Maneja los botones del panel
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    service: &MusicService,
) -> Result<()> {
    let Some(action) = PanelAction::from_custom_id(&component.data.custom_id) else {
        debug!("Componente ignorado: {}", component.data.custom_id);
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    component
        .create_response(&ctx.http, deferred_ephemeral())
        .await?;

    let reply = service.button(guild_id, component.user.id, action).await;

    component
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_interactions_get_the_disabled_notice() {
        let json = serde_json::to_value(not_ready_response()).unwrap();
        assert_eq!(
            json["data"]["content"],
            "⚠️ Music is currently disabled (Lavalink offline / not configured)."
        );
    }
}
