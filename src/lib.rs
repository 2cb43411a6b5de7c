//! slirc-bot - Straylight IRC bot
//!
//! A persistent multi-network IRC client. It keeps one session per
//! configured network alive, dispatches events to compiled-in modules,
//! runs commands for authorized users and can replace its own process
//! without dropping connections.

pub mod bot;
pub mod config;
pub mod error;
pub mod modules;
pub mod network;
pub mod telemetry;

pub use bot::Bot;
pub use config::Config;
pub use error::{BotError, BotResult, RestartError, SessionError};
