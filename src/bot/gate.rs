use serenity::model::id::{ChannelId, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::{
    audio::{node::AudioNode, session::GuildSession},
    ui::chat::ChatPlatform,
};

/// Motivo por el que se rechaza una acción; `Display` es el texto efímero
/// que ve el usuario.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    #[error("⏳ Wait 1 second...")]
    Cooldown,

    #[error("Bot is not connected to a voice channel.")]
    BotNotConnected,

    #[error("You must be in the same voice channel as the bot.")]
    InvokerNotInVoice,

    #[error("You must be in the same voice channel as the bot.")]
    ChannelMismatch,
}

/// Valida que quien interactúa comparte canal de voz con el bot.
///
/// Solo lee estado: el cooldown lo registra la acción mutante al
/// confirmarse, nunca el chequeo.
#[derive(Clone)]
pub struct VoiceGateKeeper {
    chat: Arc<dyn ChatPlatform>,
}

impl VoiceGateKeeper {
    pub fn new(chat: Arc<dyn ChatPlatform>) -> Self {
        Self { chat }
    }

    /// Chequeo completo para botones del panel: cooldown, bot en voz,
    /// invocador en voz, mismo canal. Devuelve el canal del bot.
    pub async fn authorize(
        &self,
        session: &GuildSession,
        node: Option<&dyn AudioNode>,
        invoker: UserId,
    ) -> Result<ChannelId, Denial> {
        if session.cooldown_active() {
            return Err(Denial::Cooldown);
        }

        self.authorize_same_channel(session, node, invoker).await
    }

    /// Como [`authorize`](Self::authorize) pero sin cooldown (`/stop`).
    pub async fn authorize_same_channel(
        &self,
        session: &GuildSession,
        node: Option<&dyn AudioNode>,
        invoker: UserId,
    ) -> Result<ChannelId, Denial> {
        let guild_id = session.guild_id();

        let bot_channel = match node {
            Some(node) => {
                let status = node.status(guild_id).await;
                status.channel_id.filter(|_| status.connected)
            }
            None => None,
        }
        .ok_or(Denial::BotNotConnected)?;

        let invoker_channel = self
            .chat
            .voice_channel_of(guild_id, invoker)
            .ok_or(Denial::InvokerNotInVoice)?;

        if invoker_channel != bot_channel {
            debug!(
                "🚫 {} está en {} y el bot en {} (guild {})",
                invoker, invoker_channel, bot_channel, guild_id
            );
            return Err(Denial::ChannelMismatch);
        }

        Ok(bot_channel)
    }
}
