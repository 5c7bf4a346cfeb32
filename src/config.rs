use anyhow::Result;
use std::time::Duration;

/// Credenciales del nodo Lavalink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// URI base, por ejemplo `http://lavalink:2333` (sin `/` final).
    pub uri: String,
    pub password: String,
}

impl NodeConfig {
    /// Lee `LAVALINK_URI` y `LAVALINK_PASSWORD`.
    ///
    /// Devuelve `None` si falta cualquiera de los dos: la música queda
    /// deshabilitada pero el proceso sigue vivo.
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            std::env::var("LAVALINK_URI").ok(),
            std::env::var("LAVALINK_PASSWORD").ok(),
        )
    }

    pub fn from_values(uri: Option<String>, password: Option<String>) -> Option<Self> {
        let uri = uri.unwrap_or_default().trim().trim_end_matches('/').to_string();
        let password = password.unwrap_or_default().trim().to_string();

        if uri.is_empty() || password.is_empty() {
            return None;
        }

        Some(Self { uri, password })
    }
}

/// Intervalos del driver y de los guardas de interacción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Espera máxima de cada intento de desencolar.
    pub dequeue_timeout: Duration,
    /// Sondeo del estado playing/paused del nodo.
    pub poll_interval: Duration,
    /// Pausa tras la orden de play antes de refrescar el panel.
    pub settle_delay: Duration,
    /// Ventana de inactividad antes de abandonar el canal de voz.
    pub idle_timeout: Duration,
    /// Reintento de conexión al nodo.
    pub node_retry_interval: Duration,
    /// Cooldown por guild de los botones del panel.
    pub button_cooldown: Duration,
    /// Pausa tras encolar para dar tiempo al driver a arrancar.
    pub enqueue_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(750),
            settle_delay: Duration::from_millis(250),
            idle_timeout: Duration::from_secs(120),
            node_retry_interval: Duration::from_secs(120),
            button_cooldown: Duration::from_secs(1),
            enqueue_settle: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Logging
    pub log_level: String,

    // Cola
    pub max_playlist_size: usize,

    // Tiempos
    pub timings: Timings,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let discord_token = std::env::var("DISCORD_TOKEN")
            .unwrap_or_default()
            .trim()
            .to_string();
        if discord_token.is_empty() {
            anyhow::bail!("Missing DISCORD_TOKEN env var");
        }

        let mut timings = Timings::default();
        timings.idle_timeout = Duration::from_secs(
            std::env::var("IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
        );
        timings.node_retry_interval = Duration::from_secs(
            std::env::var("NODE_RETRY_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
        );

        let config = Self {
            discord_token,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "INFO".to_string())
                .to_lowercase(),
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
            timings,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Idle timeout and node retry interval must be non-zero
    /// - Playlist cap must be greater than 0
    /// - Log level must be a known `tracing` level
    pub fn validate(&self) -> Result<()> {
        if self.timings.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.timings.node_retry_interval.is_zero() {
            anyhow::bail!("Node retry interval must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            anyhow::bail!("Unknown LOG_LEVEL: {}", self.log_level);
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: {}\n  \
            Playlist cap: {} tracks\n  \
            Idle leave: {}, node retry: {}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {}", id)),
            self.max_playlist_size,
            humantime::format_duration(self.timings.idle_timeout),
            humantime::format_duration(self.timings.node_retry_interval),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,
            log_level: "info".to_string(),
            max_playlist_size: 200,
            timings: Timings::default(),
        }
    }
}
