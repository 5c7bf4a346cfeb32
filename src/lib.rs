//! Playback core of the Tejas music bot: per-guild queues, a Lavalink-backed
//! playback driver and a live control panel, wired to Discord through serenity.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod ui;
