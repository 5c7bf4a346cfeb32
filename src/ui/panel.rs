//! # Panel
//!
//! One status message per guild, rendered from a [`SessionSnapshot`] and kept
//! in sync by [`PanelSynchronizer`]. Rendering is pure and platform-agnostic
//! ([`PanelView`]); `ui::embeds` turns a view into a serenity embed.
//!
//! Every synchronizer operation is best-effort: failures are logged and
//! swallowed, and a lost message is recreated on the next `publish`.

use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;
use tracing::{debug, warn};

use super::chat::ChatPlatform;
use crate::audio::{
    session::{GuildSession, PanelLocation, SessionSnapshot},
    track::format_duration_ms,
};

pub const BRAND_TITLE: &str = "MUSIC PROVIDED BY TEJAS";
pub const BRAND_URL: &str = "https://discord.gg/DVqvtsYNy7";
/// rgb(2, 102, 255)
pub const BRAND_COLOUR: (u8, u8, u8) = (2, 102, 255);

pub const NO_TRACK_TEXT: &str = "No track is playing.";
pub const QUEUE_ENDED_TEXT: &str =
    "All songs have been played! You can add songs again using /play command.";
pub const IDLE_LEAVE_TEXT: &str =
    "Leaving voice channel due to inactivity. You can add songs again using /play command.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl PanelField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

/// Contenido renderizado de un mensaje del bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub description: String,
    pub fields: Vec<PanelField>,
    /// Incluir la fila de botones de control.
    pub controls: bool,
}

pub fn render_now_playing(snapshot: &SessionSnapshot, controls: bool) -> PanelView {
    let mut fields = Vec::with_capacity(5);

    let description = match &snapshot.current {
        None => NO_TRACK_TEXT.to_string(),
        Some(track) => {
            let link = if track.uri().is_empty() {
                BRAND_URL
            } else {
                track.uri()
            };
            fields.push(PanelField::inline(
                "Requested By",
                format!("<@{}>", track.requester()),
            ));
            fields.push(PanelField::inline(
                "Duration",
                format_duration_ms(track.duration_ms()),
            ));
            fields.push(PanelField::inline("Author", track.author()));
            format!("**[{}]({})**", track.title(), link)
        }
    };

    fields.push(PanelField::inline(
        "Loop",
        if snapshot.loop_enabled { "On" } else { "Off" },
    ));
    fields.push(PanelField::inline(
        "Queue",
        match snapshot.queue_len {
            0 => "(empty)".to_string(),
            n => format!("{} track(s)", n),
        },
    ));

    PanelView {
        description,
        fields,
        controls,
    }
}

fn render_notice(text: &str) -> PanelView {
    PanelView {
        description: text.to_string(),
        fields: Vec::new(),
        controls: false,
    }
}

pub fn render_queue_ended() -> PanelView {
    render_notice(QUEUE_ENDED_TEXT)
}

pub fn render_idle_leave() -> PanelView {
    render_notice(IDLE_LEAVE_TEXT)
}

/// Mantiene el mensaje de panel de cada guild.
#[derive(Clone)]
pub struct PanelSynchronizer {
    chat: Arc<dyn ChatPlatform>,
}

impl PanelSynchronizer {
    pub fn new(chat: Arc<dyn ChatPlatform>) -> Self {
        Self { chat }
    }

    /// Publica el estado actual en `channel_id`.
    ///
    /// Edita el panel existente si aún está vivo; si no, lo reemplaza por un
    /// mensaje nuevo y registra su ubicación.
    pub async fn publish(&self, session: &GuildSession, channel_id: ChannelId) {
        let view = render_now_playing(&session.snapshot(), true);

        if let Some(panel) = self.live_panel(session).await {
            match self
                .chat
                .edit_message(panel.channel_id, panel.message_id, &view)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    warn!("❌ Panel edit failed en guild {}: {}", session.guild_id(), e);
                    // Que no queden dos paneles con botones
                    if let Err(e) = self
                        .chat
                        .delete_message(panel.channel_id, panel.message_id)
                        .await
                    {
                        debug!("No se pudo borrar el panel viejo: {}", e);
                    }
                }
            }
        }

        match self.chat.send_message(channel_id, &view).await {
            Ok(message_id) => {
                debug!("🪧 Panel nuevo {} en guild {}", message_id, session.guild_id());
                session.set_panel(PanelLocation {
                    channel_id,
                    message_id,
                });
            }
            Err(e) => warn!("❌ Panel send failed en guild {}: {}", session.guild_id(), e),
        }
    }

    /// Re-renderiza el panel existente; no hace nada si no hay panel.
    pub async fn refresh(&self, session: &GuildSession, keep_controls: bool) {
        let Some(panel) = self.live_panel(session).await else {
            return;
        };

        let view = render_now_playing(&session.snapshot(), keep_controls);
        self.edit(session, panel, &view, "refresh").await;
    }

    /// Estado terminal "cola terminada", sin botones.
    pub async fn show_queue_ended(&self, session: &GuildSession) {
        let Some(panel) = self.live_panel(session).await else {
            return;
        };

        self.edit(session, panel, &render_queue_ended(), "queue ended")
            .await;
    }

    /// Aviso de salida por inactividad en `channel_id`.
    pub async fn post_idle_notice(&self, channel_id: ChannelId) -> Option<MessageId> {
        match self.chat.send_message(channel_id, &render_idle_leave()).await {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                warn!("❌ Idle notice failed en canal {}: {}", channel_id, e);
                None
            }
        }
    }

    async fn live_panel(&self, session: &GuildSession) -> Option<PanelLocation> {
        let panel = session.panel()?;
        match self
            .chat
            .fetch_message(panel.channel_id, panel.message_id)
            .await
        {
            Ok(()) => Some(panel),
            Err(e) => {
                debug!("🪧 Panel {} no disponible: {}", panel.message_id, e);
                None
            }
        }
    }

    async fn edit(&self, session: &GuildSession, panel: PanelLocation, view: &PanelView, what: &str) {
        if let Err(e) = self
            .chat
            .edit_message(panel.channel_id, panel.message_id, view)
            .await
        {
            warn!(
                "❌ Panel {} failed en guild {}: {}",
                what,
                session.guild_id(),
                e
            );
        }
    }
}
