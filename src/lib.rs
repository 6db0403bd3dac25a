//! A small Discord bot answering `!` prefix commands.
//!
//! Transport lives in `gateway` (WebSocket) and `http` (REST); the weather
//! lookup in `weather`. Command parsing is in `commands`, and `handlers` holds
//! the dispatcher plus one function per command. `bot` wires it all together.

pub mod bot;
pub mod commands;
pub mod config;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod http;
pub mod types;
pub mod weather;
