//! Dobles de prueba compartidos por los tests del crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{
    node::{AudioNode, PlayerStatus, Resolution, TrackResolver},
    track::{Playable, Track},
};
use crate::{
    error::{MusicError, MusicResult},
    ui::{chat::ChatPlatform, panel::PanelView},
};

pub const REQUESTER: UserId = UserId::new(100);

#[derive(Debug)]
pub struct FakePlayable {
    name: String,
    length_ms: Option<i64>,
}

impl Playable for FakePlayable {
    fn reference(&self) -> &str {
        &self.name
    }

    fn title(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn author(&self) -> Option<String> {
        Some("Tester".to_string())
    }

    fn length_ms(&self) -> Option<i64> {
        self.length_ms
    }

    fn uri(&self) -> Option<String> {
        Some(format!("https://example.com/{}", self.name))
    }
}

/// Playable cuyo `reference` y `title` son `name`.
pub fn playable(name: &str) -> Arc<dyn Playable> {
    Arc::new(FakePlayable {
        name: name.to_string(),
        length_ms: Some(10_000),
    })
}

pub fn track(name: &str) -> Track {
    Track::new(playable(name), REQUESTER)
}

/// Llamadas registradas por [`FakeNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Join(ChannelId),
    Play(String),
    Pause(bool),
    Stop,
    Disconnect,
}

#[derive(Debug)]
struct Playback {
    reference: String,
    remaining: Duration,
    resumed_at: Option<Instant>,
}

impl Playback {
    fn finished(&self) -> bool {
        match self.resumed_at {
            Some(at) => at.elapsed() >= self.remaining,
            None => false,
        }
    }
}

#[derive(Debug)]
struct FakeNodeState {
    voice: HashMap<GuildId, ChannelId>,
    playback: HashMap<GuildId, Playback>,
    lengths: HashMap<String, Duration>,
    default_length: Duration,
    failing: HashSet<String>,
    join_delay: Duration,
    join_fails: bool,
    resolutions: HashMap<String, Resolution>,
    alive: bool,
    status_yields: bool,
    calls: Vec<NodeCall>,
}

/// Nodo de audio en memoria: simula la duración de cada pista con el reloj
/// de tokio y registra cada orden recibida.
#[derive(Debug)]
pub struct FakeNode {
    state: Mutex<FakeNodeState>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeNodeState {
                voice: HashMap::new(),
                playback: HashMap::new(),
                lengths: HashMap::new(),
                default_length: Duration::from_secs(10),
                failing: HashSet::new(),
                join_delay: Duration::ZERO,
                join_fails: false,
                resolutions: HashMap::new(),
                alive: true,
                status_yields: false,
                calls: Vec::new(),
            }),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.lock().alive = alive;
    }

    pub fn set_length(&self, reference: &str, length: Duration) {
        self.state.lock().lengths.insert(reference.to_string(), length);
    }

    pub fn fail_track(&self, reference: &str) {
        self.state.lock().failing.insert(reference.to_string());
    }

    /// `status` cede el turno antes de responder, como una llamada REST.
    pub fn set_status_yields(&self, yields: bool) {
        self.state.lock().status_yields = yields;
    }

    pub fn set_join_delay(&self, delay: Duration) {
        self.state.lock().join_delay = delay;
    }

    pub fn set_join_fails(&self, fails: bool) {
        self.state.lock().join_fails = fails;
    }

    pub fn set_resolution(&self, query: &str, resolution: Resolution) {
        self.state
            .lock()
            .resolutions
            .insert(query.to_string(), resolution);
    }

    /// Coloca el bot en un canal sin pasar por `join`.
    pub fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.state.lock().voice.insert(guild_id, channel_id);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &NodeCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn joins(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, NodeCall::Join(_)))
            .count()
    }

    /// Referencias enviadas con `play`, en orden.
    pub fn played(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                NodeCall::Play(reference) => Some(reference.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        self.state
            .lock()
            .playback
            .get(&guild_id)
            .filter(|p| !p.finished())
            .map(|p| p.reference.clone())
    }
}

impl Default for FakeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackResolver for FakeNode {
    async fn resolve(&self, query: &str) -> MusicResult<Resolution> {
        let state = self.state.lock();
        Ok(state
            .resolutions
            .get(query)
            .cloned()
            .unwrap_or_else(|| Resolution::Track(playable(query))))
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let delay = self.state.lock().join_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push(NodeCall::Join(channel_id));
        if state.join_fails {
            return Err(MusicError::VoiceConnect("gateway timeout".to_string()));
        }
        state.voice.insert(guild_id, channel_id);
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> MusicResult<()> {
        let mut state = self.state.lock();
        let reference = track.reference().to_string();
        state.calls.push(NodeCall::Play(reference.clone()));

        if state.failing.contains(&reference) {
            return Err(MusicError::Playback(format!("cannot load {}", reference)));
        }

        let remaining = state
            .lengths
            .get(&reference)
            .copied()
            .unwrap_or(state.default_length);
        state.playback.insert(
            guild_id,
            Playback {
                reference,
                remaining,
                resumed_at: Some(Instant::now()),
            },
        );
        Ok(())
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> MusicResult<()> {
        let mut state = self.state.lock();
        state.calls.push(NodeCall::Pause(paused));
        if let Some(playback) = state.playback.get_mut(&guild_id) {
            match (paused, playback.resumed_at) {
                (true, Some(at)) => {
                    playback.remaining = playback.remaining.saturating_sub(at.elapsed());
                    playback.resumed_at = None;
                }
                (false, None) => playback.resumed_at = Some(Instant::now()),
                _ => {}
            }
        }
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        let mut state = self.state.lock();
        state.calls.push(NodeCall::Stop);
        state.playback.remove(&guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        let mut state = self.state.lock();
        state.calls.push(NodeCall::Disconnect);
        state.playback.remove(&guild_id);
        state.voice.remove(&guild_id);
        Ok(())
    }

    async fn status(&self, guild_id: GuildId) -> PlayerStatus {
        let yields = self.state.lock().status_yields;
        if yields {
            tokio::task::yield_now().await;
        }

        let mut state = self.state.lock();
        let Some(channel_id) = state.voice.get(&guild_id).copied() else {
            return PlayerStatus::default();
        };

        if state.playback.get(&guild_id).is_some_and(|p| p.finished()) {
            state.playback.remove(&guild_id);
        }

        let playback = state.playback.get(&guild_id);
        PlayerStatus {
            connected: true,
            playing: playback.is_some_and(|p| p.resumed_at.is_some()),
            paused: playback.is_some_and(|p| p.resumed_at.is_none()),
            channel_id: Some(channel_id),
        }
    }

    fn forget_voice(&self, guild_id: GuildId) {
        let mut state = self.state.lock();
        state.voice.remove(&guild_id);
        state.playback.remove(&guild_id);
    }

    fn is_alive(&self) -> bool {
        self.state.lock().alive
    }
}

#[derive(Debug, Default)]
struct RecordingChatState {
    next_id: u64,
    messages: HashMap<MessageId, (ChannelId, PanelView)>,
    sent: Vec<(ChannelId, PanelView)>,
    edits: Vec<(MessageId, PanelView)>,
    voice: HashMap<(GuildId, UserId), ChannelId>,
}

/// Plataforma de chat en memoria para los tests del driver y del servicio.
#[derive(Debug, Default)]
pub struct RecordingChat {
    state: Mutex<RecordingChatState>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_in_voice(&self, guild_id: GuildId, user_id: UserId, channel_id: ChannelId) {
        self.state
            .lock()
            .voice
            .insert((guild_id, user_id), channel_id);
    }

    /// Simula que alguien borró el mensaje.
    pub fn delete_externally(&self, message_id: MessageId) {
        self.state.lock().messages.remove(&message_id);
    }

    pub fn sent(&self) -> Vec<(ChannelId, PanelView)> {
        self.state.lock().sent.clone()
    }

    pub fn edits(&self) -> Vec<(MessageId, PanelView)> {
        self.state.lock().edits.clone()
    }

    /// Contenido actual de un mensaje.
    pub fn message(&self, message_id: MessageId) -> Option<PanelView> {
        self.state
            .lock()
            .messages
            .get(&message_id)
            .map(|(_, view)| view.clone())
    }

    /// Mensajes enviados cuya descripción es `description`.
    pub fn sent_with(&self, description: &str) -> usize {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(_, view)| view.description == description)
            .count()
    }
}

#[async_trait]
impl ChatPlatform for RecordingChat {
    async fn send_message(&self, channel_id: ChannelId, view: &PanelView) -> MusicResult<MessageId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.messages.insert(id, (channel_id, view.clone()));
        state.sent.push((channel_id, view.clone()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        view: &PanelView,
    ) -> MusicResult<()> {
        let mut state = self.state.lock();
        let Some(entry) = state.messages.get_mut(&message_id) else {
            return Err(MusicError::Platform("Unknown Message".to_string()));
        };
        entry.1 = view.clone();
        state.edits.push((message_id, view.clone()));
        Ok(())
    }

    async fn fetch_message(&self, _channel_id: ChannelId, message_id: MessageId) -> MusicResult<()> {
        if self.state.lock().messages.contains_key(&message_id) {
            Ok(())
        } else {
            Err(MusicError::Platform("Unknown Message".to_string()))
        }
    }

    async fn delete_message(&self, _channel_id: ChannelId, message_id: MessageId) -> MusicResult<()> {
        self.state
            .lock()
            .messages
            .remove(&message_id)
            .map(|_| ())
            .ok_or_else(|| MusicError::Platform("Unknown Message".to_string()))
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.state.lock().voice.get(&(guild_id, user_id)).copied()
    }
}
