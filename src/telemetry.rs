//! Logging setup and span constructors.
//!
//! Every network, supervisor and module logs inside its own span, so a
//! line carries `network=` or `module=` fields instead of coming from a
//! per-component named logger.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};

use crate::config::LoggingConfig;

/// Handle for changing the log level after startup.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogHandle {
    /// Apply the level from a reloaded config.
    ///
    /// A filter taken from `RUST_LOG` is left alone.
    pub fn apply(&self, logging: &LoggingConfig) {
        if self.from_env {
            return;
        }
        if let Err(e) = self
            .filter
            .reload(EnvFilter::new(logging.filter_directive()))
        {
            tracing::warn!(error = %e, "failed to update log filter");
        }
    }
}

/// Build the filter: `RUST_LOG` if set, else the configured level.
fn build_filter(logging: &LoggingConfig) -> (EnvFilter, bool) {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(logging.filter_directive()), false),
    }
}

/// Install the global subscriber.
pub fn init(logging: &LoggingConfig) -> LogHandle {
    let (filter, from_env) = build_filter(logging);
    let (filter_layer, handle) = reload::Layer::new(filter);

    let fmt_layer = if logging.json {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    LogHandle {
        filter: handle,
        from_env,
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for everything concerning one network.
    pub fn network(name: &str) -> Span {
        info_span!("network", network = %name)
    }

    /// Span for a loaded module.
    pub fn module(qualified_name: &str) -> Span {
        info_span!("module", module = %qualified_name)
    }

    /// Span for one command invocation.
    pub fn command(name: &str, source: &str, network: &str) -> Span {
        info_span!("command", name = %name, source = %source, network = %network)
    }
}
