//! Lavalink v4 node adapter.
//!
//! A websocket session (`/v4/websocket`) yields the session id and tells us
//! when the node goes away; everything else is REST against
//! `/v4/sessions/{session}/players/{guild}`. The Discord side of the voice
//! handshake is done through songbird in gateway-only mode and handed to the
//! node as a `voice` patch.

use anyhow::Context as _;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, http::HeaderValue, Message,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    node::{AudioNode, NodeConnector, PlayerStatus, Resolution, TrackResolver},
    track::{Playable, Track},
};
use crate::{
    config::NodeConfig,
    error::{MusicError, MusicResult},
};

const CLIENT_NAME: &str = concat!("tejas-music/", env!("CARGO_PKG_VERSION"));
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Pista tal como la devuelve Lavalink.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrack {
    pub encoded: String,
    pub info: TrackInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackInfo {
    pub identifier: String,
    pub author: String,
    pub length: i64,
    pub is_stream: bool,
    pub title: String,
    pub uri: Option<String>,
    pub source_name: String,
}

impl Playable for LavalinkTrack {
    fn reference(&self) -> &str {
        &self.encoded
    }

    fn title(&self) -> Option<String> {
        Some(self.info.title.clone())
    }

    fn author(&self) -> Option<String> {
        Some(self.info.author.clone())
    }

    fn length_ms(&self) -> Option<i64> {
        // Los streams informan una longitud enorme
        (!self.info.is_stream).then_some(self.info.length)
    }

    fn uri(&self) -> Option<String> {
        self.info.uri.clone()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
enum LoadResult {
    Track(LavalinkTrack),
    Playlist(PlaylistData),
    Search(Vec<LavalinkTrack>),
    Empty(serde::de::IgnoredAny),
    Error(LoadException),
}

#[derive(Debug, Deserialize)]
struct PlaylistData {
    info: PlaylistInfo,
    tracks: Vec<LavalinkTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoadException {
    message: Option<String>,
    severity: String,
}

impl LoadResult {
    fn into_resolution(self) -> MusicResult<Resolution> {
        let wrap = |t: LavalinkTrack| -> Arc<dyn Playable> { Arc::new(t) };
        match self {
            LoadResult::Track(track) => Ok(Resolution::Track(wrap(track))),
            LoadResult::Playlist(playlist) => Ok(Resolution::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks.into_iter().map(wrap).collect(),
            }),
            LoadResult::Search(results) => {
                Ok(Resolution::Search(results.into_iter().map(wrap).collect()))
            }
            LoadResult::Empty(_) => Ok(Resolution::Empty),
            LoadResult::Error(e) => Err(MusicError::Resolve(format!(
                "{} ({})",
                e.message.unwrap_or_else(|| "unknown error".to_string()),
                e.severity
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlayerInfo {
    track: Option<LavalinkTrack>,
    #[serde(default)]
    paused: bool,
}

/// Mensajes del websocket que nos interesan.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum NodeMessage {
    Ready {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Event {
        #[serde(rename = "type")]
        kind: String,
        #[serde(rename = "guildId")]
        guild_id: String,
    },
    #[serde(other)]
    Other,
}

/// URLs se resuelven directamente; texto libre va a la búsqueda de YouTube.
pub fn search_identifier(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}

/// `http(s)://host:port` → `ws(s)://host:port/v4/websocket`.
pub fn websocket_url(base: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(base).context("LAVALINK_URI inválida")?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("No se pudo usar el esquema {}", scheme))?;
    url.set_path("/v4/websocket");
    Ok(url)
}

/// Crea sesiones [`LavalinkNode`].
pub struct LavalinkConnector {
    songbird: Arc<Songbird>,
    user_id: UserId,
    http: reqwest::Client,
}

impl LavalinkConnector {
    pub fn new(songbird: Arc<Songbird>, user_id: UserId) -> Self {
        Self {
            songbird,
            user_id,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NodeConnector for LavalinkConnector {
    async fn connect(&self, config: &NodeConfig) -> anyhow::Result<Arc<dyn AudioNode>> {
        let mut request = websocket_url(&config.uri)?
            .as_str()
            .into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&config.password)?);
        headers.insert("User-Id", HeaderValue::from_str(&self.user_id.to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("Error al abrir el websocket de Lavalink")?;

        // El primer mensaje útil es `ready` con el id de sesión
        let session_id = tokio::time::timeout(READY_TIMEOUT, async {
            while let Some(message) = socket.next().await {
                if let Message::Text(text) = message? {
                    if let Ok(NodeMessage::Ready { session_id }) =
                        serde_json::from_str::<NodeMessage>(text.as_str())
                    {
                        return Ok::<_, anyhow::Error>(session_id);
                    }
                }
            }
            anyhow::bail!("Lavalink cerró el websocket antes de `ready`")
        })
        .await
        .context("Lavalink no envió `ready` a tiempo")??;

        info!("🎼 Sesión Lavalink {} abierta", session_id);

        let alive = Arc::new(AtomicBool::new(true));
        let voice: Arc<DashMap<GuildId, ChannelId>> = Arc::new(DashMap::new());

        let reader = tokio::spawn({
            let alive = alive.clone();
            let voice = voice.clone();
            async move {
                while let Some(message) = socket.next().await {
                    match message {
                        Ok(Message::Text(text)) => handle_node_message(text.as_str(), &voice),
                        Ok(Message::Close(frame)) => {
                            warn!("🔌 Lavalink cerró la sesión: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("🔌 Error en el websocket de Lavalink: {}", e);
                            break;
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
                voice.clear();
            }
        });

        Ok(Arc::new(LavalinkNode {
            http: self.http.clone(),
            base: config.uri.clone(),
            password: config.password.clone(),
            session_id,
            songbird: self.songbird.clone(),
            voice,
            last_status: DashMap::new(),
            alive,
            reader,
        }))
    }
}

fn handle_node_message(text: &str, voice: &DashMap<GuildId, ChannelId>) {
    match serde_json::from_str::<NodeMessage>(text) {
        Ok(NodeMessage::Event { kind, guild_id }) => {
            debug!("🎼 Evento Lavalink {} en guild {}", kind, guild_id);
            if kind == "WebSocketClosedEvent" {
                if let Ok(id) = guild_id.parse::<u64>() {
                    if id != 0 {
                        voice.remove(&GuildId::new(id));
                    }
                }
            }
        }
        Ok(_) => {}
        Err(e) => debug!("Mensaje Lavalink no reconocido: {}", e),
    }
}

/// Sesión abierta con un nodo Lavalink.
pub struct LavalinkNode {
    http: reqwest::Client,
    base: String,
    password: String,
    session_id: String,
    songbird: Arc<Songbird>,
    /// Canal de voz por guild tras un `join` exitoso.
    voice: Arc<DashMap<GuildId, ChannelId>>,
    last_status: DashMap<GuildId, PlayerStatus>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl LavalinkNode {
    fn player_url(&self, guild_id: GuildId) -> String {
        format!(
            "{}/v4/sessions/{}/players/{}",
            self.base,
            self.session_id,
            guild_id.get()
        )
    }

    async fn patch_player(&self, guild_id: GuildId, body: serde_json::Value) -> MusicResult<()> {
        self.http
            .patch(self.player_url(guild_id))
            .header("Authorization", &self.password)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_player(&self, guild_id: GuildId) -> MusicResult<Option<PlayerInfo>> {
        let response = self
            .http
            .get(self.player_url(guild_id))
            .header("Authorization", &self.password)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(response.error_for_status()?.json().await?))
    }
}

impl Drop for LavalinkNode {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl TrackResolver for LavalinkNode {
    async fn resolve(&self, query: &str) -> MusicResult<Resolution> {
        let identifier = search_identifier(query);
        debug!("🔍 loadtracks {}", identifier);

        let result: LoadResult = self
            .http
            .get(format!("{}/v4/loadtracks", self.base))
            .header("Authorization", &self.password)
            .query(&[("identifier", identifier.as_str())])
            .send()
            .await
            .map_err(|e| MusicError::Resolve(e.to_string()))?
            .error_for_status()
            .map_err(|e| MusicError::Resolve(e.to_string()))?
            .json()
            .await
            .map_err(|e| MusicError::Resolve(e.to_string()))?;

        result.into_resolution()
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let (info, call) = self
            .songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::VoiceConnect(e.to_string()))?;

        // Ensordecido: el bot no necesita recibir audio
        if let Err(e) = call.lock().await.deafen(true).await {
            debug!("No se pudo ensordecer en guild {}: {}", guild_id, e);
        }

        let voice = json!({
            "voice": {
                "token": info.token,
                "endpoint": info.endpoint,
                "sessionId": info.session_id,
            }
        });

        if let Err(e) = self.patch_player(guild_id, voice).await {
            if let Err(e) = self.songbird.remove(guild_id).await {
                warn!("⚠️ No se pudo soltar la llamada de guild {}: {}", guild_id, e);
            }
            return Err(MusicError::VoiceConnect(e.to_string()));
        }

        self.voice.insert(guild_id, channel_id);
        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> MusicResult<()> {
        self.patch_player(
            guild_id,
            json!({ "track": { "encoded": track.reference() }, "paused": false }),
        )
        .await
        .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> MusicResult<()> {
        self.patch_player(guild_id, json!({ "paused": paused })).await
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        self.patch_player(guild_id, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        self.voice.remove(&guild_id);
        self.last_status.remove(&guild_id);

        let destroyed = self
            .http
            .delete(self.player_url(guild_id))
            .header("Authorization", &self.password)
            .send()
            .await;

        // Sin llamada activa en songbird no hay nada que soltar
        if let Err(e) = self.songbird.remove(guild_id).await {
            debug!("songbird.remove en guild {}: {}", guild_id, e);
        }

        match destroyed {
            Ok(response)
                if response.status().is_success()
                    || response.status() == reqwest::StatusCode::NOT_FOUND =>
            {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Ok(response) => Err(MusicError::Node(format!(
                "destroy player returned {}",
                response.status()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn status(&self, guild_id: GuildId) -> PlayerStatus {
        if !self.is_alive() {
            return PlayerStatus::default();
        }

        let Some(channel_id) = self.voice.get(&guild_id).map(|c| *c) else {
            return PlayerStatus::default();
        };

        match self.fetch_player(guild_id).await {
            Ok(Some(player)) => {
                let loaded = player.track.is_some();
                let status = PlayerStatus {
                    connected: true,
                    playing: loaded && !player.paused,
                    paused: loaded && player.paused,
                    channel_id: Some(channel_id),
                };
                self.last_status.insert(guild_id, status);
                status
            }
            // El reproductor ya no existe en el nodo
            Ok(None) => PlayerStatus::default(),
            Err(e) => {
                warn!("⚠️ Estado del reproductor no disponible: {}", e);
                self.last_status
                    .get(&guild_id)
                    .map(|s| *s)
                    .unwrap_or(PlayerStatus {
                        connected: true,
                        channel_id: Some(channel_id),
                        ..PlayerStatus::default()
                    })
            }
        }
    }

    fn forget_voice(&self, guild_id: GuildId) {
        if self.voice.remove(&guild_id).is_some() {
            debug!("🔌 Enlace de voz olvidado en guild {}", guild_id);
        }
        self.last_status.remove(&guild_id);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
