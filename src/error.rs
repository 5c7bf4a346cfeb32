use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Solo `MusicDisabled` y `VoiceConnect` llegan al usuario como fallo
/// explícito; el resto se recupera localmente (el driver pasa a la siguiente
/// canción, el panel se recrea en la próxima publicación).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    /// Nodo sin configurar o inalcanzable.
    #[error("music is disabled (Lavalink offline / not configured)")]
    MusicDisabled,

    #[error("voice connect failed: {0}")]
    VoiceConnect(String),

    /// El nodo rechazó una pista concreta.
    #[error("playback failed: {0}")]
    Playback(String),

    /// Fallo al enviar/editar/borrar un mensaje en la plataforma de chat.
    #[error("platform request failed: {0}")]
    Platform(String),

    #[error("node request failed: {0}")]
    Node(String),

    #[error("track resolution failed: {0}")]
    Resolve(String),
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;

impl From<reqwest::Error> for MusicError {
    fn from(err: reqwest::Error) -> Self {
        MusicError::Node(err.to_string())
    }
}

impl From<serenity::Error> for MusicError {
    fn from(err: serenity::Error) -> Self {
        MusicError::Platform(err.to_string())
    }
}
