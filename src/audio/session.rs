use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::time::Duration;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{queue::TrackQueue, track::Track};

/// Ubicación del mensaje de panel de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLocation {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Tarea de driver registrada en una sesión.
#[derive(Debug)]
pub struct DriverSlot {
    pub generation: u64,
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl DriverSlot {
    /// Cancela la tarea: primero el token (guarda contra tareas obsoletas),
    /// luego el abort.
    pub fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Estado mutable de una guild, protegido por un único lock.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Pista que el nodo tiene ordenada ahora mismo.
    pub current: Option<Track>,
    pub loop_enabled: bool,
    /// Señal de parada de un solo uso para el driver.
    pub stopped: bool,
    pub cooldown_until: Option<Instant>,
    pub panel: Option<PanelLocation>,
    /// Canal de texto del último `/play`, para avisos de fin de cola.
    pub last_play_channel: Option<ChannelId>,
    pub driver: Option<DriverSlot>,
    next_generation: u64,
}

impl SessionState {
    /// Reserva el número de generación del próximo driver.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub fn driver_running(&self) -> bool {
        self.driver.as_ref().is_some_and(|slot| !slot.is_finished())
    }
}

/// Vista inmutable para renderizar el panel.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub current: Option<Track>,
    pub loop_enabled: bool,
    pub queue_len: usize,
}

/// Sesión de música de una guild.
#[derive(Debug)]
pub struct GuildSession {
    guild_id: GuildId,
    pub queue: TrackQueue,
    state: Mutex<SessionState>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            queue: TrackQueue::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Ejecuta `f` con el estado bloqueado. No debe contener `await`.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Como [`with_state`](Self::with_state) pero solo si `token` sigue vivo.
    ///
    /// Un driver reemplazado o cancelado recibe `None` y no toca la sesión.
    pub fn with_state_if_live<R>(
        &self,
        token: &CancellationToken,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        if token.is_cancelled() {
            return None;
        }
        Some(f(&mut state))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            current: state.current.clone(),
            loop_enabled: state.loop_enabled,
            queue_len: self.queue.len(),
        }
    }

    pub fn current(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    pub fn has_current(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn loop_enabled(&self) -> bool {
        self.state.lock().loop_enabled
    }

    pub fn set_loop(&self, enabled: bool) {
        self.state.lock().loop_enabled = enabled;
    }

    /// Alterna el loop y devuelve el nuevo valor.
    pub fn toggle_loop(&self) -> bool {
        let mut state = self.state.lock();
        state.loop_enabled = !state.loop_enabled;
        state.loop_enabled
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Pide al driver que aborte y limpie.
    pub fn request_stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.loop_enabled = false;
    }

    /// Descarta una señal de parada pendiente (nuevo `/play` tras un stop).
    pub fn clear_stop(&self) {
        self.state.lock().stopped = false;
    }

    pub fn cooldown_active(&self) -> bool {
        self.state
            .lock()
            .cooldown_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Registra el cooldown al confirmar una acción mutante.
    pub fn commit_cooldown(&self, cooldown: Duration) {
        self.state.lock().cooldown_until = Some(Instant::now() + cooldown);
    }

    /// Comprueba y registra el cooldown bajo un solo lock.
    ///
    /// `false` si otra acción lo reclamó antes; en ese caso no toca nada.
    pub fn try_claim_cooldown(&self, cooldown: Duration) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        if state.cooldown_until.is_some_and(|until| now < until) {
            return false;
        }
        state.cooldown_until = Some(now + cooldown);
        true
    }

    pub fn panel(&self) -> Option<PanelLocation> {
        self.state.lock().panel
    }

    pub fn set_panel(&self, location: PanelLocation) {
        self.state.lock().panel = Some(location);
    }

    pub fn clear_panel(&self) {
        self.state.lock().panel = None;
    }

    pub fn last_play_channel(&self) -> Option<ChannelId> {
        self.state.lock().last_play_channel
    }

    pub fn set_last_play_channel(&self, channel_id: ChannelId) {
        self.state.lock().last_play_channel = Some(channel_id);
    }

    pub fn driver_running(&self) -> bool {
        self.state.lock().driver_running()
    }

    /// Cancela y retira el driver registrado, si lo hay.
    pub fn cancel_driver(&self) {
        if let Some(slot) = self.state.lock().driver.take() {
            debug!(
                "🛑 Cancelando driver #{} en guild {}",
                slot.generation, self.guild_id
            );
            slot.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::track;

    fn session() -> GuildSession {
        GuildSession::new(GuildId::new(1))
    }

    #[test]
    fn request_stop_also_disables_loop() {
        let s = session();
        s.set_loop(true);
        s.request_stop();
        assert!(s.is_stopped());
        assert!(!s.loop_enabled());
        s.clear_stop();
        assert!(!s.is_stopped());
    }

    #[test]
    fn toggle_loop_flips() {
        let s = session();
        assert!(s.toggle_loop());
        assert!(!s.toggle_loop());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires() {
        let s = session();
        assert!(!s.cooldown_active());
        s.commit_cooldown(Duration::from_secs(1));
        assert!(s.cooldown_active());
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(!s.cooldown_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_claim_is_exclusive() {
        let s = session();
        assert!(s.try_claim_cooldown(Duration::from_secs(1)));
        assert!(!s.try_claim_cooldown(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!s.try_claim_cooldown(Duration::from_secs(1)));
        // Un reclamo rechazado no extiende la ventana
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(s.try_claim_cooldown(Duration::from_secs(1)));
    }

    #[test]
    fn cancelled_token_blocks_mutation() {
        let s = session();
        let token = CancellationToken::new();
        assert_eq!(s.with_state_if_live(&token, |st| st.stopped), Some(false));
        token.cancel();
        assert!(s
            .with_state_if_live(&token, |st| st.current = Some(track("late")))
            .is_none());
        assert!(!s.has_current());
    }

    #[test]
    fn snapshot_reports_queue_depth() {
        let s = session();
        s.queue.push(track("one"));
        s.queue.push(track("two"));
        s.set_loop(true);
        let snap = s.snapshot();
        assert_eq!(snap.queue_len, 2);
        assert!(snap.loop_enabled);
        assert!(snap.current.is_none());
    }
}
