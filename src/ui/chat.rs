use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use super::panel::PanelView;
use crate::error::MusicResult;

/// Superficie de la plataforma de chat que usa el núcleo de música.
///
/// La implementación real envuelve el `Http`/`Cache` de serenity; los tests
/// usan un mock o un registro en memoria.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, channel_id: ChannelId, view: &PanelView) -> MusicResult<MessageId>;

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        view: &PanelView,
    ) -> MusicResult<()>;

    /// `Ok` si el mensaje sigue existiendo.
    async fn fetch_message(&self, channel_id: ChannelId, message_id: MessageId) -> MusicResult<()>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> MusicResult<()>;

    /// Canal de voz en el que está `user_id`, según el estado de voz cacheado.
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}
