//! # UI Module
//!
//! The per-guild status panel: pure rendering ([`panel`]), the chat surface it
//! is published through ([`chat`]), and the serenity embed/button builders
//! ([`embeds`], [`buttons`]).

pub mod buttons;
pub mod chat;
pub mod embeds;
pub mod panel;
