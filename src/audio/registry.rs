use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::session::GuildSession;

/// Mapa de sesiones por guild y locks de conexión de voz.
///
/// Las sesiones se crean al primer acceso y viven hasta que el bot sale de
/// la guild.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    voice_locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildSession::new(guild_id)))
            .clone()
    }

    /// Lock que serializa conectar/desconectar voz en una guild.
    pub fn voice_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.voice_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Elimina la sesión de una guild que el bot abandonó.
    ///
    /// Cualquier driver vivo queda marcado como detenido y cancelado antes de
    /// soltar la sesión.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.voice_locks.remove(&guild_id);
        let (_, session) = self.sessions.remove(&guild_id)?;

        session.request_stop();
        session.cancel_driver();
        session.queue.clear();

        info!("🧹 Sesión eliminada para guild {}", guild_id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
