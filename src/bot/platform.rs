use async_trait::async_trait;
use serenity::{
    cache::Cache,
    http::Http,
    model::id::{ChannelId, GuildId, MessageId, UserId},
};
use std::sync::Arc;

use crate::{
    error::MusicResult,
    ui::{chat::ChatPlatform, embeds, panel::PanelView},
};

/// [`ChatPlatform`] sobre el `Http` y la `Cache` de serenity.
#[derive(Clone)]
pub struct SerenityChat {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl ChatPlatform for SerenityChat {
    async fn send_message(&self, channel_id: ChannelId, view: &PanelView) -> MusicResult<MessageId> {
        let message = channel_id
            .send_message(&self.http, embeds::create_message(view))
            .await?;
        Ok(message.id)
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        view: &PanelView,
    ) -> MusicResult<()> {
        channel_id
            .edit_message(&self.http, message_id, embeds::edit_message(view))
            .await?;
        Ok(())
    }

    async fn fetch_message(&self, channel_id: ChannelId, message_id: MessageId) -> MusicResult<()> {
        self.http.get_message(channel_id, message_id).await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> MusicResult<()> {
        self.http
            .delete_message(channel_id, message_id, None)
            .await?;
        Ok(())
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.cache
            .guild(guild_id)?
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
    }
}
