//! Win back the configured nick.
//!
//! Every `interval` seconds (default 120) each network whose current nick
//! differs from its configured one is asked for the configured nick again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::bot::{Module, ModuleContext};

/// Default check interval in seconds.
pub const DEFAULT_INTERVAL: u64 = 120;

pub struct KeepNickModule {
    interval: Duration,
}

impl KeepNickModule {
    pub fn build(ctx: &ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
        let secs = match ctx.config().get("interval") {
            None => DEFAULT_INTERVAL,
            Some(value) => value
                .as_integer()
                .and_then(|v| u64::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| anyhow::anyhow!("interval must be a positive integer"))?,
        };
        Ok(Arc::new(Self {
            interval: Duration::from_secs(secs),
        }))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Ask for the configured nick wherever we run under another one.
fn reclaim(ctx: &ModuleContext) {
    let Some(bot) = ctx.bot() else {
        return;
    };
    for name in bot.network_names() {
        let Some(session) = bot.network(&name) else {
            continue;
        };
        let wanted = session.settings().nick;
        let current = session.nick();
        if current == wanted {
            continue;
        }
        info!(network = %name, current = %current, wanted = %wanted, "trying to get nick back");
        if let Err(e) = session.change_nick(&wanted) {
            debug!(network = %name, error = %e, "could not send NICK");
        }
    }
}

#[async_trait]
impl Module for KeepNickModule {
    async fn startup(&self, ctx: &ModuleContext) -> anyhow::Result<()> {
        let period = self.interval;
        let task_ctx = ctx.clone();
        ctx.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                reclaim(&task_ctx);
            }
        });
        Ok(())
    }
}
