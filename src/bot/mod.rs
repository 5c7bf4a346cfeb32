//! # Bot Module
//!
//! Serenity glue around the music core:
//!
//! - [`MusicBot`] implements [`EventHandler`]; on the first `ready` it builds
//!   the [`MusicService`] (Lavalink connector, session registry, serenity chat
//!   surface), connects the node and starts the node auto-recovery task.
//! - [`commands`] registers `/play` and `/stop`, per guild when `GUILD_ID` is
//!   set, globally otherwise.
//! - [`handlers`] defers every interaction ephemerally and answers with the
//!   reply produced by the service.
//! - [`gate`] is the voice-channel/cooldown check in front of every mutating
//!   panel action.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
    model::id::UserId,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

pub mod commands;
pub mod gate;
pub mod handlers;
pub mod platform;

use crate::{
    audio::{
        lavalink::LavalinkConnector, node::NodeConnectionManager, registry::SessionRegistry,
        service::MusicService,
    },
    config::{Config, NodeConfig},
};
use platform::SerenityChat;

/// Manejador de eventos de Discord.
pub struct MusicBot {
    config: Arc<Config>,
    /// Se construye en el primer `ready`, cuando ya hay `Http`, `Cache` y songbird.
    service: OnceCell<Arc<MusicService>>,
    recovery_started: AtomicBool,
}

impl MusicBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            service: OnceCell::new(),
            recovery_started: AtomicBool::new(false),
        }
    }

    async fn build_service(&self, ctx: &Context, user_id: UserId) -> Result<Arc<MusicService>> {
        let songbird = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let connector = Arc::new(LavalinkConnector::new(songbird, user_id));
        let nodes = Arc::new(NodeConnectionManager::new(connector, NodeConfig::from_env));
        let chat = Arc::new(SerenityChat::new(ctx.http.clone(), ctx.cache.clone()));

        Ok(Arc::new(MusicService::new(
            Arc::new(SessionRegistry::new()),
            nodes,
            chat,
            self.config.timings,
            self.config.max_playlist_size,
        )))
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(&ctx.http, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(&ctx.http).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }

        let service = match self
            .service
            .get_or_try_init(|| self.build_service(&ctx, ready.user.id))
            .await
        {
            Ok(service) => service.clone(),
            Err(e) => {
                error!("❌ No se pudo iniciar el servicio de música: {:?}", e);
                return;
            }
        };

        service.nodes().connect().await;

        if !self.recovery_started.swap(true, Ordering::SeqCst) {
            let nodes = service.nodes().clone();
            let interval = self.config.timings.node_retry_interval;
            tokio::spawn(nodes.auto_recovery_loop(interval));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(service) = self.service.get() else {
            warn!("⚠️ Interacción recibida antes de ready");
            if let Err(e) = handlers::handle_not_ready(&ctx, &interaction).await {
                error!("Error respondiendo interacción temprana: {:?}", e);
            }
            return;
        };

        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, service).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, service).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Caída de Discord, no expulsión
        if incomplete.unavailable {
            return;
        }

        if let Some(service) = self.service.get() {
            info!("🚪 Bot retirado de guild {}", incomplete.id);
            service.handle_guild_removed(incomplete.id).await;
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }

        if let (Some(guild_id), Some(service)) = (new.guild_id, self.service.get()) {
            info!("🔌 Bot desconectado de voz en guild {}", guild_id);
            service.handle_bot_voice_left(guild_id);
        }
    }
}
