//! slirc-bot - Straylight IRC bot
//!
//! Loads the configuration, resumes connections handed over by a previous
//! process, and runs until interrupted. SIGUSR1 reloads the configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use slirc_bot::bot::ModuleRegistry;
use slirc_bot::network::StateFile;
use slirc_bot::{Bot, Config, telemetry};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Longest we wait for QUIT to go out on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "slirc-bot", version, about = "Persistent multi-network IRC bot")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// State file left by the process this one replaces
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let log = telemetry::init(&config.logging);

    info!(
        config = %args.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "starting slirc-bot"
    );

    let state = args
        .state
        .as_deref()
        .and_then(|path| match StateFile::load_and_remove(path) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring restart state");
                None
            }
        });

    let bot = Bot::new(
        args.config,
        config,
        ModuleRegistry::with_builtins(),
        state,
        Some(log),
    );
    bot.start().await.context("failed to start")?;

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut term = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = usr1.recv() => {
                info!("SIGUSR1 received, reloading config");
                if let Err(e) = bot.reload().await {
                    error!(error = %e, "reload failed");
                }
            }
            _ = term.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, bot.shutdown(Some("Shutting down")))
        .await
        .is_err()
    {
        warn!("connections did not close in time");
    }
    Ok(())
}
