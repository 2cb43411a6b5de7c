//! Built-in administration and help commands.

use std::sync::Arc;

use async_trait::async_trait;
use slirc_proto::User;
use tracing::{debug, error, warn};

use crate::bot::{Arity, Bot, CommandSpec, Module, ModuleContext, Scope};
use crate::network::NetworkSession;

pub struct CommandsModule;

impl CommandsModule {
    pub fn build(_ctx: &ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
        Ok(Arc::new(Self))
    }
}

fn say(ctx: &ModuleContext, scope: &Scope, text: &str) {
    if let Err(e) = ctx.say(scope, text) {
        debug!(error = %e, "failed to reply");
    }
}

/// Resolve the network and check the channel name, replying on failure.
fn channel_and_network(
    ctx: &ModuleContext,
    bot: &Bot,
    scope: &Scope,
    channel: &str,
    network: &str,
) -> Option<Arc<NetworkSession>> {
    let Some(session) = bot.network(network) else {
        say(ctx, scope, &format!("Unknown network: {network}"));
        return None;
    };
    if !session.namer().is_channel(channel) {
        say(ctx, scope, &format!("Invalid channel name: {channel}"));
        return None;
    }
    Some(session)
}

fn help(ctx: &ModuleContext, bot: &Bot, user: &User, scope: &Scope, command: Option<&str>) {
    let Some(command) = command else {
        let names = bot.command_names(user);
        if names.is_empty() {
            say(ctx, scope, "No commands available for you, sorry");
        } else {
            say(ctx, scope, &format!("Available commands: {}", names.join(", ")));
        }
        return;
    };

    let prefix = bot.command_prefix();
    let command = command.strip_prefix(prefix.as_str()).unwrap_or(command);
    match bot.command_spec(user, command) {
        None => say(ctx, scope, &format!("No such command: {command}")),
        Some(spec) => {
            say(ctx, scope, &format!("Usage: {}", spec.synopsis));
            if !spec.help.is_empty() {
                say(ctx, scope, &spec.help);
            }
        }
    }
}

#[async_trait]
impl Module for CommandsModule {
    fn admin_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("reload", "Reload configuration and modules"),
            CommandSpec::new(
                "restart",
                "Restart the bot without disconnecting from networks",
            ),
            CommandSpec::new("networks", "List networks"),
            CommandSpec::new("join", "Join a channel on the given network")
                .arity(Arity::Exact(2))
                .synopsis("join <channel> <network>"),
            CommandSpec::new("part", "Part a channel on the given network")
                .arity(Arity::Rest(2))
                .synopsis("part <channel> <network> [<message>]"),
        ]
    }

    fn public_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("help", "Print command help")
                .arity(Arity::Range(0, 1))
                .synopsis("help [<command>]"),
        ]
    }

    async fn on_command(
        &self,
        ctx: &ModuleContext,
        command: &str,
        user: &User,
        scope: &Scope,
        args: Vec<String>,
    ) {
        let Some(bot) = ctx.bot() else {
            return;
        };

        match (command, args.as_slice()) {
            ("reload", []) => match bot.reload().await {
                Ok(()) => say(ctx, scope, "Reload OK"),
                Err(e) => {
                    error!(error = %e, "reload failed");
                    say(ctx, scope, &format!("Reload failed: {e}"));
                }
            },
            ("restart", []) => {
                say(ctx, scope, "Restarting");
                if let Err(e) = bot.restart().await {
                    say(ctx, scope, &format!("Restart failed: {e}"));
                }
            }
            ("networks", []) => {
                let names = bot.network_names().join(", ");
                say(ctx, scope, &format!("My networks: {names}"));
            }
            ("join", [channel, network]) => {
                if let Some(session) = channel_and_network(ctx, &bot, scope, channel, network)
                    && let Err(e) = session.join(channel, None)
                {
                    say(ctx, scope, &format!("Failed to join {channel}: {e}"));
                }
            }
            ("part", [channel, network, rest @ ..]) => {
                let message = rest.first().map(String::as_str);
                if let Some(session) = channel_and_network(ctx, &bot, scope, channel, network)
                    && let Err(e) = session.part(channel, message)
                {
                    say(ctx, scope, &format!("Failed to part {channel}: {e}"));
                }
            }
            ("help", [name]) => help(ctx, &bot, user, scope, Some(name.as_str())),
            ("help", []) => help(ctx, &bot, user, scope, None),
            _ => warn!(command, ?args, "unexpected command invocation"),
        }
    }
}
