//! Modules compiled into the bot.

pub mod commands;
pub mod keepnick;

use crate::bot::ModuleRegistry;

/// Register the `core:` modules.
pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry
        .register("core:commands", commands::CommandsModule::build)
        .register("core:keepnick", keepnick::KeepNickModule::build);
}
