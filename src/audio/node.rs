//! # Audio Node
//!
//! Seams towards the external audio node (Lavalink) and the process-wide
//! [`NodeConnectionManager`] that owns the single connection to it.
//!
//! The node is an external dependency that can be down at boot or flap. The
//! manager never raises connect failures to callers: it records the node as
//! unavailable, music commands answer with a "music disabled" notice, and a
//! background task retries on a fixed interval.

use async_trait::async_trait;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::track::{Playable, Track};
use crate::{config::NodeConfig, error::MusicResult};

/// Estado del reproductor de una guild según el nodo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Enlace de voz vivo.
    pub connected: bool,
    pub playing: bool,
    pub paused: bool,
    pub channel_id: Option<ChannelId>,
}

impl PlayerStatus {
    /// Hay una pista cargada, sonando o en pausa.
    pub fn is_active(&self) -> bool {
        self.playing || self.paused
    }
}

/// Resultado de resolver una búsqueda o URL.
#[derive(Debug, Clone)]
pub enum Resolution {
    Empty,
    Track(Arc<dyn Playable>),
    /// Resultados de búsqueda por palabras clave, mejor coincidencia primero.
    Search(Vec<Arc<dyn Playable>>),
    Playlist {
        name: String,
        tracks: Vec<Arc<dyn Playable>>,
    },
}

impl Resolution {
    /// Pistas a encolar: una sola para coincidencias/búsquedas, hasta
    /// `max_playlist` para playlists.
    pub fn into_playables(self, max_playlist: usize) -> Vec<Arc<dyn Playable>> {
        match self {
            Resolution::Empty => Vec::new(),
            Resolution::Track(track) => vec![track],
            Resolution::Search(results) => results.into_iter().take(1).collect(),
            Resolution::Playlist { tracks, .. } => tracks.into_iter().take(max_playlist).collect(),
        }
    }
}

/// Colaborador de búsqueda: texto libre o URL → referencias reproducibles.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> MusicResult<Resolution>;
}

/// Operaciones remotas sobre el nodo de audio, por guild.
#[async_trait]
pub trait AudioNode: TrackResolver {
    /// Une el bot al canal de voz y enlaza el reproductor del nodo.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;

    async fn play(&self, guild_id: GuildId, track: &Track) -> MusicResult<()>;

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> MusicResult<()>;

    /// Detiene la pista actual sin soltar la voz.
    async fn stop(&self, guild_id: GuildId) -> MusicResult<()>;

    /// Destruye el reproductor y sale del canal de voz.
    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()>;

    /// Último estado conocido; nunca falla.
    async fn status(&self, guild_id: GuildId) -> PlayerStatus;

    /// El bot salió de la voz por fuera del nodo (kick, mover, gateway).
    fn forget_voice(&self, _guild_id: GuildId) {}

    /// `false` cuando la sesión con el nodo se perdió.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Abre una conexión nueva con el nodo.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, config: &NodeConfig) -> anyhow::Result<Arc<dyn AudioNode>>;
}

type ConfigSource = Arc<dyn Fn() -> Option<NodeConfig> + Send + Sync>;

/// Dueño de la conexión única con el nodo de audio.
pub struct NodeConnectionManager {
    config_source: ConfigSource,
    connector: Arc<dyn NodeConnector>,
    node: RwLock<Option<Arc<dyn AudioNode>>>,
    /// Último estado observado, para avisar una sola vez de la pérdida.
    ready: AtomicBool,
    unavailable: AtomicBool,
    connect_lock: Mutex<()>,
}

impl NodeConnectionManager {
    /// `config_source` se consulta en cada intento de conexión.
    pub fn new(
        connector: Arc<dyn NodeConnector>,
        config_source: impl Fn() -> Option<NodeConfig> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config_source: Arc::new(config_source),
            connector,
            node: RwLock::new(None),
            ready: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            connect_lock: Mutex::new(()),
        }
    }

    /// Conecta con el nodo si aún no está listo.
    ///
    /// Idempotente y serializado. Nunca devuelve error: sin configuración o
    /// ante un fallo queda marcado como no disponible.
    pub async fn connect(&self) {
        let _guard = self.connect_lock.lock().await;

        if self.is_ready() {
            return;
        }

        let Some(config) = (self.config_source)() else {
            warn!("⚠️ Music disabled: set LAVALINK_URI and LAVALINK_PASSWORD env vars to enable Lavalink.");
            self.mark_unavailable();
            return;
        };

        info!("🎼 Conectando a Lavalink en {}", config.uri);

        match self.connector.connect(&config).await {
            Ok(node) => {
                *self.node.write() = Some(node);
                self.unavailable.store(false, Ordering::SeqCst);
                self.ready.store(true, Ordering::SeqCst);
                info!("✅ Lavalink node connected: {}", config.uri);
            }
            Err(e) => {
                error!("❌ Lavalink node connect failed (music disabled): {:?}", e);
                self.mark_unavailable();
            }
        }
    }

    /// Comprobación no bloqueante.
    pub fn is_ready(&self) -> bool {
        let alive = self
            .node
            .read()
            .as_ref()
            .is_some_and(|node| node.is_alive());

        if !alive && self.ready.swap(false, Ordering::SeqCst) {
            warn!("🔌 Sesión con Lavalink perdida");
        }

        alive
    }

    /// `true` si el último intento falló o no había configuración.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// Nodo listo para usarse, si lo hay.
    pub fn node(&self) -> Option<Arc<dyn AudioNode>> {
        if !self.is_ready() {
            return None;
        }
        self.node.read().clone()
    }

    /// Tarea de fondo: cada `interval` reintenta si el nodo no está listo.
    ///
    /// Corre hasta que el proceso termina (o se aborta su handle).
    pub async fn auto_recovery_loop(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;

            if self.is_ready() {
                continue;
            }

            info!("🔄 Reintentando conexión con Lavalink...");
            self.unavailable.store(false, Ordering::SeqCst);
            self.connect().await;
        }
    }

    fn mark_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
        *self.node.write() = None;
        self.ready.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for NodeConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnectionManager")
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .field("unavailable", &self.is_unavailable())
            .finish()
    }
}
