//! # Audio Module
//!
//! Per-guild playback orchestration on top of an external Lavalink node.
//!
//! ## Architecture
//!
//! ### [`session`] / [`registry`] - Guild State
//! - One [`GuildSession`](session::GuildSession) per guild: queue, current
//!   track, loop/stop flags, cooldown, panel location and driver handle
//! - [`SessionRegistry`](registry::SessionRegistry) creates sessions lazily and
//!   tears them down when the bot leaves a guild
//!
//! ### [`driver`] - Playback Driver
//! - Long-running state machine per guild (Idle → Playing → Draining → ...)
//! - Supervisor guaranteeing at most one live driver per guild
//!
//! ### [`node`] / [`lavalink`] - Audio Node
//! - Collaborator traits for playback and track resolution
//! - Connection manager with graceful degradation and auto-recovery
//! - Lavalink v4 adapter (websocket session + REST players API)
//!
//! ### [`service`] - Commands & Buttons
//! - `/play`, `/stop` and panel button semantics

pub mod driver;
pub mod lavalink;
pub mod node;
pub mod queue;
pub mod registry;
pub mod service;
pub mod session;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
