//! Mutation surface shared by slash commands and panel buttons.
//!
//! Every method returns the ephemeral reply text for the invoker; nothing in
//! here fails the interaction itself.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{
    driver::ensure_driver,
    node::{AudioNode, NodeConnectionManager},
    registry::SessionRegistry,
    session::GuildSession,
    track::Track,
};
use crate::{
    bot::gate::{Denial, VoiceGateKeeper},
    config::Timings,
    error::MusicError,
    ui::{buttons::PanelAction, chat::ChatPlatform, panel::PanelSynchronizer},
};

pub const NO_TRACKS_TEXT: &str = "No tracks found. (Make sure Lavalink YouTube plugin is enabled.)";

/// Por qué `/play` no pudo asegurar la conexión de voz.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceRefusal {
    #[error("⚠️ Music is currently disabled (Lavalink offline / not configured).")]
    MusicDisabled,

    #[error("You must be in a voice channel.")]
    NotInVoice,

    #[error("Bot is already connected in a different voice channel.")]
    OtherChannel,

    #[error("Voice connect failed: {0}")]
    Connect(String),
}

pub struct MusicService {
    registry: Arc<SessionRegistry>,
    nodes: Arc<NodeConnectionManager>,
    chat: Arc<dyn ChatPlatform>,
    panel: PanelSynchronizer,
    gate: VoiceGateKeeper,
    timings: Timings,
    max_playlist_size: usize,
}

impl MusicService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        nodes: Arc<NodeConnectionManager>,
        chat: Arc<dyn ChatPlatform>,
        timings: Timings,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            registry,
            nodes,
            panel: PanelSynchronizer::new(chat.clone()),
            gate: VoiceGateKeeper::new(chat.clone()),
            chat,
            timings,
            max_playlist_size,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn nodes(&self) -> &Arc<NodeConnectionManager> {
        &self.nodes
    }

    /// Conecta el bot al canal de voz del invocador, o reutiliza la conexión.
    ///
    /// Serializado por el lock de voz de la guild: dos `/play` simultáneos
    /// nunca abren dos conexiones.
    pub async fn ensure_voice(
        &self,
        guild_id: GuildId,
        invoker: UserId,
    ) -> Result<Arc<dyn AudioNode>, VoiceRefusal> {
        let node = self.nodes.node().ok_or(VoiceRefusal::MusicDisabled)?;

        let user_channel = self
            .chat
            .voice_channel_of(guild_id, invoker)
            .ok_or(VoiceRefusal::NotInVoice)?;

        let lock = self.registry.voice_lock(guild_id);
        let _guard = lock.lock().await;

        let status = node.status(guild_id).await;
        if status.connected {
            return match status.channel_id {
                Some(bot_channel) if bot_channel != user_channel => Err(VoiceRefusal::OtherChannel),
                _ => Ok(node),
            };
        }

        if let Err(e) = node.join(guild_id, user_channel).await {
            error!("❌ Voice connect failed en guild {}: {}", guild_id, e);
            let reason = match e {
                MusicError::VoiceConnect(reason) => reason,
                other => other.to_string(),
            };
            return Err(VoiceRefusal::Connect(reason));
        }

        Ok(node)
    }

    /// `/play`: resuelve, encola, asegura el driver y publica el panel.
    pub async fn play(
        &self,
        guild_id: GuildId,
        text_channel: Option<ChannelId>,
        invoker: UserId,
        query: &str,
    ) -> String {
        let node = match self.ensure_voice(guild_id, invoker).await {
            Ok(node) => node,
            Err(refusal) => return refusal.to_string(),
        };

        let session = self.registry.session(guild_id);
        if let Some(channel_id) = text_channel {
            session.set_last_play_channel(channel_id);
        }

        let resolution = match node.resolve(query).await {
            Ok(resolution) => resolution,
            Err(e) => {
                error!("❌ /play failed en guild {}: {}", guild_id, e);
                return format!("Play failed: {}", e);
            }
        };

        let playables = resolution.into_playables(self.max_playlist_size);
        if playables.is_empty() {
            return NO_TRACKS_TEXT.to_string();
        }

        // Un stop anterior no debe tumbar al driver nuevo
        session.clear_stop();

        let added = session
            .queue
            .extend(playables.into_iter().map(|p| Track::new(p, invoker)));
        let queued = session.queue.len();
        info!("📥 {} pista(s) encoladas en guild {}", added, guild_id);

        ensure_driver(&session, node, self.panel.clone(), self.timings).await;
        tokio::time::sleep(self.timings.enqueue_settle).await;

        if let Some(channel_id) = text_channel {
            self.panel.publish(&session, channel_id).await;
        }
        self.panel.refresh(&session, true).await;

        format!("Queued: {} track(s).", queued)
    }

    /// `/stop`: mismo canal de voz que el bot (sin cooldown) y luego la
    /// acción de stop del panel.
    pub async fn stop_command(&self, guild_id: GuildId, invoker: UserId) -> String {
        let session = self.registry.session(guild_id);
        let node = self.nodes.node();

        if let Err(denial) = self
            .gate
            .authorize_same_channel(&session, node.as_deref(), invoker)
            .await
        {
            return denial.to_string();
        }

        session.commit_cooldown(self.timings.button_cooldown);
        self.stop(&session, node).await
    }

    /// Botón del panel. La denegación no toca el estado de la sesión.
    pub async fn button(&self, guild_id: GuildId, invoker: UserId, action: PanelAction) -> String {
        let session = self.registry.session(guild_id);
        let node = self.nodes.node();

        if let Err(denial) = self.gate.authorize(&session, node.as_deref(), invoker).await {
            return denial.to_string();
        }

        // Otra pulsación pudo pasar el gate durante los `await`
        if !session.try_claim_cooldown(self.timings.button_cooldown) {
            return Denial::Cooldown.to_string();
        }

        match action {
            PanelAction::Stop => self.stop(&session, node).await,
            PanelAction::ToggleLoop => {
                let enabled = session.toggle_loop();
                self.panel.refresh(&session, true).await;
                format!("🔁 Loop: {}", if enabled { "On" } else { "Off" })
            }
            PanelAction::Skip => {
                session.set_loop(false);
                let Some(node) = node else {
                    return "Not connected.".to_string();
                };
                self.skip(&session, node.as_ref()).await
            }
            PanelAction::Resume | PanelAction::Pause => {
                let Some(node) = node else {
                    return "Not connected.".to_string();
                };
                self.set_paused(&session, node.as_ref(), action == PanelAction::Pause)
                    .await
            }
        }
    }

    async fn set_paused(&self, session: &GuildSession, node: &dyn AudioNode, pause: bool) -> String {
        let guild_id = session.guild_id();
        let status = node.status(guild_id).await;
        if !status.connected {
            return "Not connected.".to_string();
        }

        let reply = match (pause, status.playing, status.paused) {
            (true, true, false) => {
                if let Err(e) = node.set_paused(guild_id, true).await {
                    warn!("⚠️ pause falló en guild {}: {}", guild_id, e);
                }
                "⏸️ Paused."
            }
            (true, _, _) => "Nothing is playing.",
            (false, _, true) => {
                if let Err(e) = node.set_paused(guild_id, false).await {
                    warn!("⚠️ resume falló en guild {}: {}", guild_id, e);
                }
                "▶️ Resumed."
            }
            (false, _, false) => "Already playing.",
        };

        self.panel.refresh(session, true).await;
        reply.to_string()
    }

    async fn skip(&self, session: &GuildSession, node: &dyn AudioNode) -> String {
        let guild_id = session.guild_id();
        let status = node.status(guild_id).await;
        if !status.connected {
            return "Not connected.".to_string();
        }

        let reply = if status.is_active() {
            if let Err(e) = node.stop(guild_id).await {
                warn!("⚠️ skip falló en guild {}: {}", guild_id, e);
            }
            "⏭️ Skipped."
        } else {
            "Nothing to skip."
        };

        if session.queue.is_empty() && !session.has_current() {
            self.panel.show_queue_ended(session).await;
        } else {
            self.panel.refresh(session, true).await;
        }

        reply.to_string()
    }

    async fn stop(&self, session: &GuildSession, node: Option<Arc<dyn AudioNode>>) -> String {
        let guild_id = session.guild_id();
        session.request_stop();

        if let Some(node) = node {
            let lock = self.registry.voice_lock(guild_id);
            let _guard = lock.lock().await;

            if node.status(guild_id).await.connected {
                if let Err(e) = node.stop(guild_id).await {
                    warn!("⚠️ stop falló en guild {}: {}", guild_id, e);
                }
                if let Err(e) = node.disconnect(guild_id).await {
                    warn!("⚠️ disconnect falló en guild {}: {}", guild_id, e);
                }
            }
        }

        session.queue.clear();
        session.with_state(|st| st.current = None);

        self.panel.show_queue_ended(session).await;
        session.clear_panel();

        info!("⏹️ Stop pedido en guild {}", guild_id);
        "⏹️ Stopped.".to_string()
    }

    /// El bot salió de la guild.
    pub async fn handle_guild_removed(&self, guild_id: GuildId) {
        if self.registry.remove(guild_id).is_none() {
            return;
        }

        if let Some(node) = self.nodes.node() {
            if let Err(e) = node.disconnect(guild_id).await {
                warn!("⚠️ No se pudo liberar el reproductor de guild {}: {}", guild_id, e);
            }
        }
    }

    /// El estado de voz del propio bot dejó de tener canal.
    pub fn handle_bot_voice_left(&self, guild_id: GuildId) {
        if let Some(node) = self.nodes.node() {
            node.forget_voice(guild_id);
        }
    }
}
