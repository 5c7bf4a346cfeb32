use serenity::model::id::UserId;
use std::{fmt, sync::Arc};

/// Referencia reproducible opaca producida por el resolvedor de pistas.
///
/// Los metadatos son opcionales: cada fuente rellena lo que tiene y
/// [`Track::new`] aplica las cadenas de respaldo una sola vez.
pub trait Playable: fmt::Debug + Send + Sync {
    /// Identificador que el nodo de audio entiende (p. ej. el `encoded` de Lavalink).
    fn reference(&self) -> &str;

    fn title(&self) -> Option<String>;

    fn author(&self) -> Option<String>;

    /// Respaldo cuando la fuente no informa `author`.
    fn artist(&self) -> Option<String> {
        None
    }

    /// Duración en milisegundos.
    fn length_ms(&self) -> Option<i64>;

    /// Respaldo cuando la fuente no informa `length_ms`.
    fn duration_ms(&self) -> Option<i64> {
        None
    }

    fn uri(&self) -> Option<String>;

    /// Respaldo cuando la fuente no informa `uri`.
    fn url(&self) -> Option<String> {
        None
    }
}

/// Pista en cola: la referencia reproducible más quién la pidió.
///
/// Inmutable una vez construida.
#[derive(Clone)]
pub struct Track {
    playable: Arc<dyn Playable>,
    requester: UserId,
    title: String,
    author: String,
    duration_ms: Option<i64>,
    uri: String,
}

impl Track {
    pub fn new(playable: Arc<dyn Playable>, requester: UserId) -> Self {
        let title = non_empty(playable.title()).unwrap_or_else(|| "Unknown".to_string());
        let author = non_empty(playable.author())
            .or_else(|| non_empty(playable.artist()))
            .unwrap_or_else(|| "Unknown".to_string());
        // 0 cuenta como ausente para pasar al respaldo
        let duration_ms = playable
            .length_ms()
            .filter(|ms| *ms != 0)
            .or_else(|| playable.duration_ms());
        let uri = non_empty(playable.uri())
            .or_else(|| non_empty(playable.url()))
            .unwrap_or_default();

        Self {
            playable,
            requester,
            title,
            author,
            duration_ms,
            uri,
        }
    }

    pub fn reference(&self) -> &str {
        self.playable.reference()
    }

    pub fn requester(&self) -> UserId {
        self.requester
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("title", &self.title)
            .field("requester", &self.requester)
            .field("reference", &self.playable.reference())
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Formatea una duración en milisegundos: `Xh Ym Zs`, `Ym Zs` o `Unknown`.
pub fn format_duration_ms(ms: Option<i64>) -> String {
    let ms = match ms {
        Some(ms) if ms > 0 => ms,
        _ => return "Unknown".to_string(),
    };

    let total_seconds = ms / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes >= 60 {
        format!("{}h {}m {}s", minutes / 60, minutes % 60, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}
