use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tokio::sync::Notify;
use tracing::debug;

use super::track::Track;

/// Cola FIFO de una guild.
///
/// Sin límite de tamaño; admite `push` concurrente desde las interacciones y
/// una espera con timeout desde el driver. El orden de inserción nunca se
/// altera.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: Mutex<VecDeque<Track>>,
    available: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una pista al final de la cola.
    pub fn push(&self, track: Track) {
        debug!("➕ Encolado: {}", track.title());
        self.items.lock().push_back(track);
        self.available.notify_one();
    }

    /// Agrega varias pistas como un bloque contiguo, conservando su orden.
    pub fn extend(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let batch: Vec<Track> = tracks.into_iter().collect();
        let added = batch.len();
        if added == 0 {
            return 0;
        }

        self.items.lock().extend(batch);
        debug!("➕ Encoladas {} pistas", added);
        self.available.notify_one();
        added
    }

    /// Espera hasta `timeout` a que haya al menos una pista, sin tomarla.
    ///
    /// El driver toma la pista después con [`try_pop`](Self::try_pop) bajo
    /// el lock de la sesión.
    pub async fn wait_available(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.available.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if !self.is_empty() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Toma la siguiente pista sin esperar.
    pub fn try_pop(&self) -> Option<Track> {
        self.items.lock().pop_front()
    }

    /// Vacía la cola y devuelve cuántas pistas se descartaron.
    pub fn clear(&self) -> usize {
        let dropped = self.items.lock().drain(..).count();
        if dropped > 0 {
            debug!("🗑️ Cola limpiada ({} pistas)", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
