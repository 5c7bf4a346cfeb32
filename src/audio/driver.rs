//! # Playback Driver
//!
//! One long-running task per guild that drains the session queue through the
//! audio node:
//!
//! ```text
//! Idle ──claim──▶ Playing ──completion──▶ Idle
//!   ▲               │  ▲                    │ queue empty, loop off
//!   │               └──┘ Looping            ▼
//!   └──── new track / playback ─────── Draining ──idle window──▶ Terminated
//!
//! stopped (any state) ──▶ Stopping ──▶ Terminated
//! voice lost (any state) ──────────────▶ Terminated
//! ```
//!
//! Every mutation of the session goes through
//! [`GuildSession::with_state_if_live`], so a driver that was replaced by
//! [`ensure_driver`] can never touch the session again, even if it is still
//! mid-flight when the replacement starts.

use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    node::AudioNode,
    session::{DriverSlot, GuildSession, SessionState},
    track::Track,
};
use crate::{config::Timings, ui::panel::PanelSynchronizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Playing,
    Looping,
    Draining,
    Stopping,
    Terminated,
}

/// Motivo de salida del driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    Stopped,
    VoiceLost,
    IdleTimeout,
    /// Reemplazado o cancelado por el supervisor.
    Cancelled,
}

enum Step {
    Continue,
    Exit(DriverExit),
}

enum PollOutcome {
    Finished,
    Stopped,
    Disconnected,
    Cancelled,
}

pub struct PlaybackDriver {
    session: Arc<GuildSession>,
    node: Arc<dyn AudioNode>,
    panel: PanelSynchronizer,
    timings: Timings,
    token: CancellationToken,
    generation: u64,
    state: DriverState,
}

impl PlaybackDriver {
    pub fn new(
        session: Arc<GuildSession>,
        node: Arc<dyn AudioNode>,
        panel: PanelSynchronizer,
        timings: Timings,
        token: CancellationToken,
        generation: u64,
    ) -> Self {
        Self {
            session,
            node,
            panel,
            timings,
            token,
            generation,
            state: DriverState::Idle,
        }
    }

    pub async fn run(mut self) -> DriverExit {
        debug!(
            "▶️ Driver #{} iniciado en guild {}",
            self.generation,
            self.session.guild_id()
        );

        let exit = loop {
            if let Step::Exit(exit) = self.tick().await {
                break exit;
            }
        };

        self.transition(DriverState::Terminated);
        info!(
            "🏁 Driver #{} terminado en guild {}: {:?}",
            self.generation,
            self.session.guild_id(),
            exit
        );
        exit
    }

    /// Una vuelta del bucle principal, desde el tope.
    async fn tick(&mut self) -> Step {
        let guild_id = self.session.guild_id();

        if self.token.is_cancelled() {
            return Step::Exit(DriverExit::Cancelled);
        }

        if self.session.is_stopped() {
            return self.shutdown().await;
        }

        if !self.node.status(guild_id).await.connected {
            if self.live(|st| st.current = None).is_none() {
                return Step::Exit(DriverExit::Cancelled);
            }
            warn!("🔌 Voz perdida en guild {}", guild_id);
            return Step::Exit(DriverExit::VoiceLost);
        }

        self.transition(DriverState::Idle);

        let available = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Step::Exit(DriverExit::Cancelled),
            available = self.session.queue.wait_available(self.timings.dequeue_timeout) => available,
        };
        if !available {
            return Step::Continue;
        }

        let track = match self.claim_next() {
            None => return Step::Exit(DriverExit::Cancelled),
            Some(None) => return Step::Continue,
            Some(Some(track)) => track,
        };

        if let Step::Exit(exit) = self.play_through(track).await {
            return Step::Exit(exit);
        }

        let drained = self.session.queue.is_empty()
            && self
                .session
                .with_state(|st| !st.stopped && !st.loop_enabled);
        if drained {
            return self.drain().await;
        }

        Step::Continue
    }

    /// Toma la siguiente pista y la marca como `current` en un solo paso.
    ///
    /// `None` si el driver quedó obsoleto; `Some(None)` si la cola estaba vacía.
    fn claim_next(&self) -> Option<Option<Track>> {
        let queue = &self.session.queue;
        self.live(|st| {
            let track = queue.try_pop()?;
            st.current = Some(track.clone());
            Some(track)
        })
    }

    /// Reproduce `track` (ya marcada como `current`) hasta que termine, con
    /// repeticiones mientras el loop siga activo.
    async fn play_through(&mut self, mut track: Track) -> Step {
        let guild_id = self.session.guild_id();

        loop {
            if let Err(e) = self.node.play(guild_id, &track).await {
                warn!(
                    "❌ No se pudo reproducir '{}' en guild {}: {}",
                    track.title(),
                    guild_id,
                    e
                );
                if self.live(|st| st.current = None).is_none() {
                    return Step::Exit(DriverExit::Cancelled);
                }
                // Sin atascar la guild: probar la siguiente de inmediato
                match self.claim_next() {
                    None => return Step::Exit(DriverExit::Cancelled),
                    Some(Some(next)) => {
                        track = next;
                        continue;
                    }
                    Some(None) => return Step::Continue,
                }
            }

            let looping = self.session.loop_enabled();
            self.transition(if looping {
                DriverState::Looping
            } else {
                DriverState::Playing
            });
            debug!("🎵 Reproduciendo '{}' en guild {}", track.title(), guild_id);

            if !self.pause(self.timings.settle_delay).await {
                return Step::Exit(DriverExit::Cancelled);
            }
            self.panel.refresh(&self.session, true).await;

            match self.poll_until_finished().await {
                PollOutcome::Finished => {}
                PollOutcome::Cancelled => return Step::Exit(DriverExit::Cancelled),
                PollOutcome::Stopped => {
                    // La limpieza la hace el tope del bucle
                    return match self.live(|st| st.current = None) {
                        Some(()) => Step::Continue,
                        None => Step::Exit(DriverExit::Cancelled),
                    };
                }
                PollOutcome::Disconnected => {
                    if self.live(|st| st.current = None).is_none() {
                        return Step::Exit(DriverExit::Cancelled);
                    }
                    warn!("🔌 Voz perdida en guild {} durante la reproducción", guild_id);
                    return Step::Exit(DriverExit::VoiceLost);
                }
            }

            let replay = self.live(|st| {
                if st.loop_enabled {
                    true
                } else {
                    st.current = None;
                    false
                }
            });

            match replay {
                None => return Step::Exit(DriverExit::Cancelled),
                Some(true) => debug!("🔁 Repitiendo '{}' en guild {}", track.title(), guild_id),
                Some(false) => return Step::Continue,
            }
        }
    }

    async fn poll_until_finished(&self) -> PollOutcome {
        let guild_id = self.session.guild_id();

        loop {
            let status = self.node.status(guild_id).await;

            if self.session.is_stopped() {
                if status.is_active() {
                    if let Err(e) = self.node.stop(guild_id).await {
                        warn!("⚠️ stop falló en guild {}: {}", guild_id, e);
                    }
                }
                return PollOutcome::Stopped;
            }

            if !status.connected {
                return PollOutcome::Disconnected;
            }

            if !status.is_active() {
                return PollOutcome::Finished;
            }

            if !self.pause(self.timings.poll_interval).await {
                return PollOutcome::Cancelled;
            }
        }
    }

    /// Cola terminada: panel en estado final y ventana de inactividad.
    async fn drain(&mut self) -> Step {
        let guild_id = self.session.guild_id();
        self.transition(DriverState::Draining);

        self.panel.show_queue_ended(&self.session).await;

        // Ticks cortos para que `stopped` siga respondiendo
        let deadline = Instant::now() + self.timings.idle_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !self.pause((deadline - now).min(self.timings.poll_interval)).await {
                return Step::Exit(DriverExit::Cancelled);
            }
            if self.session.is_stopped() {
                return Step::Continue;
            }
        }

        if !self.session.queue.is_empty() {
            debug!("📥 Nuevas pistas durante la espera en guild {}", guild_id);
            return Step::Continue;
        }

        let status = self.node.status(guild_id).await;
        if status.is_active() || !status.connected {
            return Step::Continue;
        }

        if self.token.is_cancelled() {
            return Step::Exit(DriverExit::Cancelled);
        }

        if let Some(channel_id) = self.session.last_play_channel() {
            self.panel.post_idle_notice(channel_id).await;
        }

        if let Err(e) = self.node.disconnect(guild_id).await {
            warn!("⚠️ disconnect falló en guild {}: {}", guild_id, e);
        }

        if self
            .live(|st| {
                st.current = None;
                st.panel = None;
            })
            .is_none()
        {
            return Step::Exit(DriverExit::Cancelled);
        }

        info!("💤 Saliendo por inactividad en guild {}", guild_id);
        Step::Exit(DriverExit::IdleTimeout)
    }

    /// `stopped` observado: limpiar todo y salir.
    async fn shutdown(&mut self) -> Step {
        let guild_id = self.session.guild_id();
        self.transition(DriverState::Stopping);

        let queue = &self.session.queue;
        let Some(dropped) = self.live(|st| {
            st.current = None;
            st.loop_enabled = false;
            st.panel = None;
            queue.clear()
        }) else {
            return Step::Exit(DriverExit::Cancelled);
        };

        if let Err(e) = self.node.stop(guild_id).await {
            warn!("⚠️ stop falló en guild {}: {}", guild_id, e);
        }
        if let Err(e) = self.node.disconnect(guild_id).await {
            warn!("⚠️ disconnect falló en guild {}: {}", guild_id, e);
        }

        // Señal de un solo uso
        self.live(|st| st.stopped = false);

        info!(
            "⏹️ Reproducción detenida en guild {} ({} pistas descartadas)",
            guild_id, dropped
        );
        Step::Exit(DriverExit::Stopped)
    }

    /// Espera cancelable; `false` si el token se canceló.
    async fn pause(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    fn live<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        self.session.with_state_if_live(&self.token, f)
    }

    fn transition(&mut self, next: DriverState) {
        if self.state != next {
            debug!(
                "🔀 Driver #{} guild {}: {:?} → {:?}",
                self.generation,
                self.session.guild_id(),
                self.state,
                next
            );
            self.state = next;
        }
    }
}

/// Supervisor: garantiza como mucho un driver vivo por guild.
///
/// Arranca uno nuevo si no hay ninguno corriendo, o si hay uno pero la
/// sesión está inactiva (sin `current` y el nodo sin reproducir ni pausar);
/// en ese caso el anterior se cancela. Devuelve `true` si arrancó un driver.
pub async fn ensure_driver(
    session: &Arc<GuildSession>,
    node: Arc<dyn AudioNode>,
    panel: PanelSynchronizer,
    timings: Timings,
) -> bool {
    let status = node.status(session.guild_id()).await;

    session.with_state(|st| {
        let idle = st.current.is_none() && !status.is_active();
        if st.driver_running() && !idle {
            return false;
        }

        if let Some(previous) = st.driver.take() {
            if !previous.is_finished() {
                debug!(
                    "♻️ Reemplazando driver #{} inactivo en guild {}",
                    previous.generation,
                    session.guild_id()
                );
            }
            previous.cancel();
        }

        let generation = st.next_generation();
        let token = CancellationToken::new();
        let driver = PlaybackDriver::new(
            session.clone(),
            node,
            panel,
            timings,
            token.clone(),
            generation,
        );
        let handle = tokio::spawn(async move {
            driver.run().await;
        });

        st.driver = Some(DriverSlot {
            generation,
            token,
            handle,
        });
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{track, FakeNode, NodeCall, RecordingChat},
        ui::panel::{IDLE_LEAVE_TEXT, QUEUE_ENDED_TEXT},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);
    const VC: ChannelId = ChannelId::new(30);
    const TEXT: ChannelId = ChannelId::new(40);

    struct Harness {
        session: Arc<GuildSession>,
        node: Arc<FakeNode>,
        chat: Arc<RecordingChat>,
        panel: PanelSynchronizer,
        timings: Timings,
    }

    impl Harness {
        fn new() -> Self {
            let node = Arc::new(FakeNode::new());
            node.connect_voice(GUILD, VC);
            let chat = Arc::new(RecordingChat::new());
            Self {
                session: Arc::new(GuildSession::new(GUILD)),
                node,
                panel: PanelSynchronizer::new(chat.clone()),
                chat,
                timings: Timings::default(),
            }
        }

        fn enqueue(&self, names: &[&str]) {
            self.session.queue.extend(names.iter().map(|n| track(n)));
        }

        async fn ensure(&self) -> bool {
            ensure_driver(
                &self.session,
                self.node.clone(),
                self.panel.clone(),
                self.timings,
            )
            .await
        }

        fn current(&self) -> Option<String> {
            self.session.current().map(|t| t.title().to_string())
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn plays_queue_in_fifo_order() {
        let h = Harness::new();
        h.enqueue(&["a", "b", "c"]);
        assert!(h.ensure().await);

        sleep(secs(40)).await;
        assert_eq!(h.node.played(), vec!["a", "b", "c"]);
        assert_eq!(h.current(), None);
        assert!(h.session.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_terminates_within_one_poll_interval() {
        let h = Harness::new();
        h.enqueue(&["a", "b", "c"]);
        h.ensure().await;

        sleep(secs(2)).await;
        assert_eq!(h.current().as_deref(), Some("a"));

        h.session.request_stop();
        sleep(h.timings.poll_interval + Duration::from_millis(10)).await;

        assert!(!h.session.driver_running());
        assert!(h.session.queue.is_empty());
        assert_eq!(h.current(), None);
        assert!(!h.session.loop_enabled());
        // El flag es de un solo uso
        assert!(!h.session.is_stopped());
        assert_eq!(h.node.count(&NodeCall::Disconnect), 1);
        assert_eq!(h.node.played(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_replays_current_track_until_disabled() {
        let h = Harness::new();
        h.node.set_length("a", secs(5));
        h.enqueue(&["a", "b"]);
        h.ensure().await;

        sleep(secs(1)).await;
        h.session.set_loop(true);
        sleep(secs(12)).await;

        let played = h.node.played();
        assert!(played.iter().filter(|r| *r == "a").count() >= 3);
        assert!(!played.contains(&"b".to_string()));
        assert_eq!(h.current().as_deref(), Some("a"));

        h.session.set_loop(false);
        sleep(secs(8)).await;

        let played = h.node.played();
        assert_eq!(played.last().map(String::as_str), Some("b"));
        assert!(played[..played.len() - 1].iter().all(|r| r == "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_queue_ends_panel_then_leaves_once() {
        let h = Harness::new();
        h.session.set_last_play_channel(TEXT);
        h.panel.publish(&h.session, TEXT).await;
        let panel_id = h.session.panel().unwrap().message_id;

        h.enqueue(&["a"]);
        h.ensure().await;

        sleep(secs(11)).await;
        assert_eq!(
            h.chat.message(panel_id).unwrap().description,
            QUEUE_ENDED_TEXT
        );
        assert!(!h.chat.message(panel_id).unwrap().controls);
        assert_eq!(h.node.count(&NodeCall::Disconnect), 0);

        sleep(secs(125)).await;
        assert_eq!(h.chat.sent_with(IDLE_LEAVE_TEXT), 1);
        assert_eq!(h.node.count(&NodeCall::Disconnect), 1);
        assert!(h.session.panel().is_none());
        assert!(!h.session.driver_running());

        sleep(secs(600)).await;
        assert_eq!(h.chat.sent_with(IDLE_LEAVE_TEXT), 1);
        assert_eq!(h.node.count(&NodeCall::Disconnect), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_track_is_skipped() {
        let h = Harness::new();
        h.node.fail_track("bad");
        h.enqueue(&["bad", "good"]);
        h.ensure().await;

        sleep(secs(1)).await;
        assert_eq!(h.node.played(), vec!["bad", "good"]);
        assert_eq!(h.current().as_deref(), Some("good"));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_voice_terminates_driver() {
        let h = Harness::new();
        h.enqueue(&["a", "b"]);
        h.ensure().await;

        sleep(secs(2)).await;
        h.node.forget_voice(GUILD);
        sleep(secs(1)).await;

        assert!(!h.session.driver_running());
        assert_eq!(h.current(), None);
        // La cola se conserva para un próximo /play
        assert_eq!(h.session.queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn track_queued_while_draining_is_played_after_the_window() {
        let h = Harness::new();
        h.enqueue(&["a"]);
        h.ensure().await;

        sleep(secs(20)).await;
        h.enqueue(&["b"]);
        sleep(secs(115)).await;

        assert_eq!(h.node.played(), vec!["a", "b"]);
        assert_eq!(h.node.count(&NodeCall::Disconnect), 0);
        assert!(h.session.driver_running());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_restarts_a_draining_driver() {
        let h = Harness::new();
        h.enqueue(&["a"]);
        h.ensure().await;
        let first = h.session.with_state(|st| st.driver.as_ref().map(|d| d.generation));

        sleep(secs(20)).await;
        h.enqueue(&["b"]);
        assert!(h.ensure().await);
        sleep(secs(1)).await;

        assert_eq!(h.node.played(), vec!["a", "b"]);
        let second = h.session.with_state(|st| st.driver.as_ref().map(|d| d.generation));
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_driver_is_not_duplicated() {
        let h = Harness::new();
        h.enqueue(&["a"]);
        assert!(h.ensure().await);
        sleep(secs(1)).await;

        h.enqueue(&["b"]);
        assert!(!h.ensure().await);
        assert!(!h.ensure().await);

        sleep(secs(25)).await;
        assert_eq!(h.node.played(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_driver_leaves_session_alone() {
        let h = Harness::new();
        h.ensure().await;
        sleep(secs(1)).await;

        h.session.cancel_driver();
        h.enqueue(&["a"]);
        sleep(secs(5)).await;

        assert!(h.node.played().is_empty());
        assert_eq!(h.session.queue.len(), 1);
        assert_eq!(h.current(), None);
    }
}
