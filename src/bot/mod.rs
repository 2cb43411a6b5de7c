//! The bot: networks, modules, commands.
//!
//! [`Bot`] owns one [`NetworkSession`] and one supervisor task per
//! configured network, the loaded modules and their command tables. It is
//! the delegate for every session's events; PRIVMSG is where commands come
//! from.

pub mod commands;
pub mod module;
pub mod rate_limit;
pub mod scope;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use slirc_proto::User;
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{self, Config, ValidationError};
use crate::error::{BotError, BotResult};
use crate::network::{
    HandlerSet, NetworkSession, ParamCount, SavedNetwork, StateFile, restart, supervisor, transport,
};
use crate::telemetry::{LogHandle, spans};

pub use commands::{Arity, CommandRegistry, CommandSpec, Tier};
pub use module::{LoadedModule, Module, ModuleContext, ModuleFactory, ModuleRegistry, TimerHandle};
pub use rate_limit::CommandLimiter;
pub use scope::Scope;

/// Connections detached for a restart and the state file listing them.
pub struct Handover {
    path: PathBuf,
    held: Vec<(Arc<NetworkSession>, std::net::TcpStream, Vec<u8>)>,
}

impl Handover {
    /// The state file to pass to the new process.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the networks whose connections were detached.
    pub fn networks(&self) -> Vec<String> {
        self.held
            .iter()
            .map(|(session, _, _)| session.name().to_owned())
            .collect()
    }

    /// Give up on the restart: delete the state file and put every
    /// connection back on its session.
    pub fn cancel(self) {
        let _ = std::fs::remove_file(&self.path);
        for (session, stream, unread) in self.held {
            if let Err(e) = session.reattach(stream, &unread) {
                warn!(network = %session.name(), error = %e, "failed to take connection back");
            }
        }
    }
}

/// Everything that is rebuilt on module reload.
#[derive(Default)]
struct ModuleSet {
    prefix: String,
    modules: Vec<Arc<LoadedModule>>,
    commands: CommandRegistry<Arc<LoadedModule>>,
    exports: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

pub struct Bot {
    me: Weak<Bot>,
    config_path: PathBuf,
    config: RwLock<Arc<Config>>,
    registry: ModuleRegistry,
    modules: RwLock<Arc<ModuleSet>>,
    networks: RwLock<BTreeMap<String, Arc<NetworkSession>>>,
    supervisors: Mutex<HashMap<String, AbortHandle>>,
    /// Connections inherited from the previous process, not yet resumed.
    saved: Mutex<BTreeMap<String, SavedNetwork>>,
    limiter: RwLock<Arc<CommandLimiter>>,
    handlers: Arc<HandlerSet>,
    log: Option<LogHandle>,
}

impl Bot {
    /// Create a bot. Nothing connects until [`Bot::start`].
    pub fn new(
        config_path: impl Into<PathBuf>,
        config: Config,
        registry: ModuleRegistry,
        state: Option<StateFile>,
        log: Option<LogHandle>,
    ) -> Arc<Self> {
        let limiter = CommandLimiter::new(config.security.command_rate_per_minute);
        let saved = state.map(|s| s.networks).unwrap_or_default();

        Arc::new_cyclic(|me: &Weak<Bot>| Self {
            me: me.clone(),
            config_path: config_path.into(),
            config: RwLock::new(Arc::new(config)),
            registry,
            modules: RwLock::new(Arc::default()),
            networks: RwLock::new(BTreeMap::new()),
            supervisors: Mutex::new(HashMap::new()),
            saved: Mutex::new(saved),
            limiter: RwLock::new(Arc::new(limiter)),
            handlers: Arc::new(Self::delegate_handlers(me.clone())),
            log,
        })
    }

    fn delegate_handlers(bot: Weak<Bot>) -> HandlerSet {
        let mut set = HandlerSet::new();
        set.on("PRIVMSG", ParamCount::Exact(3), move |session, prefix, args| {
            if let Some(bot) = bot.upgrade() {
                bot.on_privmsg(session, prefix, &args[0], &args[1]);
            }
        });
        set
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn network(&self, name: &str) -> Option<Arc<NetworkSession>> {
        self.networks.read().get(name).cloned()
    }

    /// Configured network names, sorted.
    pub fn network_names(&self) -> Vec<String> {
        self.networks.read().keys().cloned().collect()
    }

    pub fn export(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.modules.read().exports.get(name).cloned()
    }

    pub fn command_prefix(&self) -> String {
        self.modules.read().prefix.clone()
    }

    /// Names of loaded modules.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .read()
            .modules
            .iter()
            .map(|m| m.ctx.name().to_owned())
            .collect()
    }

    /// True if `user` matches one of the admin hostmasks.
    pub fn is_admin(&self, user: &User) -> bool {
        self.config.read().admins.iter().any(|mask| user.matches(mask))
    }

    fn tier_for(&self, user: &User) -> Tier {
        if self.is_admin(user) {
            Tier::Admin
        } else {
            Tier::Public
        }
    }

    /// Sorted names of the commands `user` may run.
    pub fn command_names(&self, user: &User) -> Vec<String> {
        self.modules.read().commands.names(self.tier_for(user))
    }

    /// The spec of a command `user` may run.
    pub fn command_spec(&self, user: &User, name: &str) -> Option<CommandSpec> {
        self.modules
            .read()
            .commands
            .get(self.tier_for(user), name)
            .map(|c| c.spec.clone())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load modules and start every configured network.
    pub async fn start(&self) -> BotResult<()> {
        let config = Config::clone(&self.config());
        self.apply(config).await
    }

    /// Re-read the configuration file and apply it.
    ///
    /// If the file cannot be loaded the running configuration stays.
    pub async fn reload(&self) -> BotResult<()> {
        let config = Config::load(&self.config_path)?;
        self.apply(config).await?;
        info!("reload complete");
        Ok(())
    }

    async fn apply(&self, config: Config) -> BotResult<()> {
        if let Err(errors) = config::validate(&config) {
            let mut fatal = None;
            for e in errors {
                match e {
                    ValidationError::MissingHost(_)
                    | ValidationError::MissingNick(_)
                    | ValidationError::ZeroPing(_) => {
                        error!(error = %e, "network will not be started");
                    }
                    _ => {
                        error!(error = %e, "invalid configuration");
                        fatal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = fatal {
                return Err(e.into());
            }
        }

        if let Some(dir) = config.datadir()
            && !dir.exists()
            && let Err(e) = std::fs::create_dir_all(&dir)
        {
            error!(path = %dir.display(), error = %e, "failed to create datadir");
        }

        if let Some(log) = &self.log {
            log.apply(&config.logging);
        }

        let config = Arc::new(config);
        *self.config.write() = Arc::clone(&config);
        *self.limiter.write() = Arc::new(CommandLimiter::new(
            config.security.command_rate_per_minute,
        ));

        self.load_modules(&config).await;
        self.sync_networks(&config);
        Ok(())
    }

    async fn load_modules(&self, config: &Arc<Config>) {
        let old = std::mem::take(&mut *self.modules.write());
        for loaded in &old.modules {
            loaded.shutdown().await;
        }
        drop(old);

        let mut exports: HashMap<String, Arc<dyn Any + Send + Sync>> = HashMap::new();
        let mut built = Vec::new();
        for (name, factory) in self.registry.iter() {
            let ctx = ModuleContext::new(name, self.me.clone(), Arc::clone(config));
            info!(module = %name, "loading module");
            let module = match factory(&ctx) {
                Ok(module) => module,
                Err(e) => {
                    error!(module = %name, error = %e, "failed to load module");
                    continue;
                }
            };

            if let Some(export) = module.export_as()
                && exports
                    .insert(export.to_owned(), Arc::clone(&module).into_any())
                    .is_some()
            {
                warn!(export = %export, "export already exists, overwriting");
            }
            built.push(Arc::new(LoadedModule { module, ctx }));
        }

        // Exports are visible while modules start.
        *self.modules.write() = Arc::new(ModuleSet {
            prefix: config.command_prefix.clone(),
            exports: exports.clone(),
            ..ModuleSet::default()
        });

        let mut set = ModuleSet {
            prefix: config.command_prefix.clone(),
            exports,
            ..ModuleSet::default()
        };
        for loaded in built {
            let started = loaded
                .module
                .startup(&loaded.ctx)
                .instrument(loaded.ctx.span().clone())
                .await;
            if let Err(e) = started {
                error!(module = %loaded.ctx.name(), error = %e, "unable to start module");
                loaded.ctx.cancel_all();
                continue;
            }

            for spec in loaded.module.admin_commands() {
                set.commands.register(Tier::Admin, spec, Arc::clone(&loaded));
            }
            for spec in loaded.module.public_commands() {
                set.commands.register(Tier::Public, spec, Arc::clone(&loaded));
            }
            set.modules.push(loaded);
        }

        *self.modules.write() = Arc::new(set);
    }

    fn sync_networks(&self, config: &Config) {
        for name in config.networks.keys() {
            let Some(settings) = config.network(name) else {
                continue;
            };
            if settings.validate().is_err() {
                // Already reported by validation.
                continue;
            }

            if let Some(session) = self.network(name) {
                if let Err(e) = session.reconfigure(settings) {
                    error!(network = %name, error = %e, "failed to reconfigure network");
                }
                continue;
            }

            let session = match NetworkSession::new(settings, Some(Arc::clone(&self.handlers))) {
                Ok(session) => session,
                Err(e) => {
                    error!(network = %name, error = %e, "failed to create network");
                    continue;
                }
            };
            let saved = self.saved.lock().remove(name);
            self.networks
                .write()
                .insert(name.clone(), Arc::clone(&session));
            let task = supervisor::spawn(session, saved);
            self.supervisors
                .lock()
                .insert(name.clone(), task.abort_handle());
        }

        let removed: Vec<String> = self
            .networks
            .read()
            .keys()
            .filter(|name| !config.networks.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            info!(network = %name, "network removed from configuration, disconnecting");
            if let Some(task) = self.supervisors.lock().remove(&name) {
                task.abort();
            }
            if let Some(session) = self.networks.write().remove(&name) {
                session.disconnect();
            }
        }

        // Inherited connections nobody resumed are closed.
        let leftovers = std::mem::take(&mut *self.saved.lock());
        for (name, state) in leftovers {
            warn!(network = %name, "closing inherited connection for unconfigured network");
            if let Err(e) = transport::adopt_fd(state.fd) {
                debug!(network = %name, error = %e, "inherited descriptor was not usable");
            }
        }
    }

    /// Replace the process, keeping plain connections open.
    ///
    /// Only returns on failure; the connections are then taken back.
    pub async fn restart(&self) -> BotResult<()> {
        let handover = self.prepare_restart().await?;
        let err = restart::exec_with_state(handover.path());
        error!(error = %err, "restart failed, resuming connections");
        handover.cancel();
        Err(err.into())
    }

    /// Detach every connection that can survive an exec and write the
    /// state file describing them to the data directory.
    pub async fn prepare_restart(&self) -> BotResult<Handover> {
        let datadir = self.config().datadir().ok_or(BotError::RestartUnavailable)?;

        let sessions: Vec<Arc<NetworkSession>> = self.networks.read().values().cloned().collect();
        let mut saved = BTreeMap::new();
        let mut held = Vec::new();
        for session in sessions {
            match session.detach_for_restart().await {
                Ok(Some((state, stream))) => {
                    held.push((Arc::clone(&session), stream, state.unread.clone()));
                    saved.insert(session.name().to_owned(), state);
                }
                Ok(None) => {
                    info!(network = %session.name(), "connection will not be kept across restart");
                }
                Err(e) => {
                    warn!(network = %session.name(), error = %e, "failed to hand over connection");
                }
            }
        }

        let handover = Handover {
            path: StateFile::path_in(&datadir),
            held,
        };
        if let Err(e) = StateFile::new(saved).save(&handover.path) {
            error!(error = %e, "failed to write restart state, resuming connections");
            handover.cancel();
            return Err(e.into());
        }
        Ok(handover)
    }

    /// Say goodbye on every network and stop all modules.
    pub async fn shutdown(&self, message: Option<&str>) {
        let tasks: Vec<AbortHandle> = self.supervisors.lock().drain().map(|(_, t)| t).collect();
        for task in tasks {
            task.abort();
        }

        let sessions: Vec<Arc<NetworkSession>> = self.networks.read().values().cloned().collect();
        for session in &sessions {
            if session.quit(message).is_err() {
                session.disconnect();
            }
        }

        let modules = std::mem::take(&mut *self.modules.write());
        for loaded in &modules.modules {
            loaded.shutdown().await;
        }

        for session in &sessions {
            session.wait_for_disconnect().await;
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Handle a PRIVMSG: run a command or pass the text to modules.
    pub fn on_privmsg(
        &self,
        session: &Arc<NetworkSession>,
        sender: Option<&str>,
        target: &str,
        text: &str,
    ) {
        let Some(user) = sender.and_then(|s| s.parse::<User>().ok()) else {
            debug!("PRIVMSG without a valid sender");
            return;
        };
        let scope = Scope::new(Arc::clone(session), user.clone(), target);
        let set = Arc::clone(&self.modules.read());

        if let Some(body) = text.strip_prefix(set.prefix.as_str()) {
            let body = body.trim();
            let (name, args) = match body.split_once(char::is_whitespace) {
                Some((name, args)) => (name, args.trim_start()),
                None => (body, ""),
            };

            if let Some(command) = set.commands.get(self.tier_for(&user), name) {
                let source = user.to_string();
                if !self.limiter.read().check(&source) {
                    return;
                }

                let Some(args) = command.spec.arity.validate(args) else {
                    let usage = format!("Usage: {}{}", set.prefix, command.spec.synopsis);
                    if let Err(e) = scope.reply(&usage) {
                        debug!(error = %e, "failed to send usage");
                    }
                    return;
                };

                let loaded = Arc::clone(&command.handler);
                let name = command.spec.name.clone();
                let span = spans::command(&name, &source, session.name());
                info!(parent: &span, "running command");
                tokio::spawn(
                    async move {
                        loaded
                            .module
                            .on_command(&loaded.ctx, &name, &user, &scope, args)
                            .await;
                    }
                    .instrument(span),
                );
                return;
            }
        }

        for loaded in &set.modules {
            let loaded = Arc::clone(loaded);
            let user = user.clone();
            let scope = scope.clone();
            let text = text.to_owned();
            let span = loaded.ctx.span().clone();
            tokio::spawn(
                async move {
                    loaded
                        .module
                        .on_message(&loaded.ctx, &user, &scope, &text)
                        .await;
                }
                .instrument(span),
            );
        }
    }
}
