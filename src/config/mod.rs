//! Configuration loading and management.
//!
//! - [`types`]: the top-level [`Config`] and its global sections
//! - [`network`]: per-network blocks and their resolution against globals
//! - [`validation`]: checks run at startup and on every reload

mod defaults;
mod network;
mod types;
mod validation;

pub use defaults::{DEFAULT_PORT, DEFAULT_PORT_TLS};
pub use network::{NetworkConfig, NetworkSettings};
pub use types::{Config, ConfigError, LoggingConfig, SecurityConfig};
pub use validation::{ValidationError, validate};
