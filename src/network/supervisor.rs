//! Reconnect loop for one network.
//!
//! connect (or resume) -> join configured channels -> wait for disconnect
//! -> connect again. Failed attempts wait out a [`Backoff`] delay; a
//! successful registration resets it. The loop only ends when its task is
//! aborted, which also cancels an in-flight connect.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

use super::backoff::Backoff;
use super::restart::SavedNetwork;
use super::session::{ConnectionState, NetworkSession};
use super::transport;
use crate::error::SessionError;

/// Spawn the supervisor inside the network's span.
pub fn spawn(session: Arc<NetworkSession>, saved: Option<SavedNetwork>) -> JoinHandle<()> {
    let span = session.span().clone();
    tokio::spawn(supervise(session, saved).instrument(span))
}

/// Keep `session` connected forever.
pub async fn supervise(session: Arc<NetworkSession>, mut saved: Option<SavedNetwork>) {
    let mut backoff = Backoff::default();

    loop {
        let fresh = if let Some(state) = saved.take() {
            info!(fd = state.fd, "reusing old connection");
            match resume(&session, state) {
                Ok(()) => false,
                Err(e) => {
                    warn!(error = %e, "failed to resume connection");
                    if session.state() == ConnectionState::Disconnected {
                        continue;
                    }
                    true
                }
            }
        } else {
            let result = session.connect().await;
            // connect may switch to a new target, so log afterwards
            let (host, port) = (session.host(), session.port());
            match result {
                Ok(()) => {
                    info!(host = %host, port, "connected");
                    backoff.reset();
                }
                Err(e) => {
                    error!(host = %host, port, error = %e, code = e.error_code(), "failed to connect");
                    let delay = backoff.current();
                    info!(delay_secs = delay.as_secs_f64(), "waiting before reconnecting");
                    backoff.sleep().await;
                    continue;
                }
            }
            true
        };

        // A resumed session already asked for the channels it lacks.
        if fresh {
            join_configured(&session);
        }
        session.wait_for_disconnect().await;
        info!(host = %session.host(), port = session.port(), "connection lost, reconnecting");
    }
}

fn resume(session: &Arc<NetworkSession>, saved: SavedNetwork) -> Result<(), SessionError> {
    let stream = transport::adopt_fd(saved.fd)?;
    session.resume(saved, stream)
}

/// Join configured channels that are not joined yet.
fn join_configured(session: &NetworkSession) {
    for channel in session.settings().channels {
        if session.is_joined(&channel) {
            continue;
        }
        if let Err(e) = session.join(&channel, None) {
            warn!(channel = %channel, error = %e, "failed to join channel");
        }
    }
}
