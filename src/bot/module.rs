//! Module interface and the helpers modules get from the bot.
//!
//! Modules are compiled in and registered by qualified name
//! (`core:commands`) in a [`ModuleRegistry`]. On every (re)load the bot
//! builds each module from its factory, starts it, and registers its
//! commands. A module's timers and tracked tasks are cancelled when it is
//! shut down.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use slirc_proto::User;
use tokio::io::AsyncWriteExt;
use tokio::task::AbortHandle;
use tracing::{Instrument, Span, debug};

use super::Bot;
use super::commands::CommandSpec;
use super::scope::Scope;
use crate::config::Config;
use crate::error::{BotError, BotResult, SessionError};
use crate::telemetry::spans;

/// Lets a module be shared as an export and downcast by its users.
pub trait AsAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A bot extension.
///
/// Every method has a default, so a module only implements what it uses.
/// Commands declared in [`Module::admin_commands`] and
/// [`Module::public_commands`] arrive in [`Module::on_command`] with their
/// arguments already validated.
#[async_trait]
pub trait Module: AsAny {
    /// Commands only admins may run.
    fn admin_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Commands anyone may run (admins included).
    fn public_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Name under which other modules can find this one.
    fn export_as(&self) -> Option<&str> {
        None
    }

    /// Called after every module has been built. Long-running work
    /// belongs in [`ModuleContext::spawn`].
    async fn startup(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before a reload or exit; timers are already cancelled.
    async fn shutdown(&self, _ctx: &ModuleContext) {}

    /// A message that is not a known command.
    async fn on_message(&self, _ctx: &ModuleContext, _user: &User, _scope: &Scope, _text: &str) {}

    /// One of this module's commands.
    async fn on_command(
        &self,
        _ctx: &ModuleContext,
        _command: &str,
        _user: &User,
        _scope: &Scope,
        _args: Vec<String>,
    ) {
    }
}

/// Builds a module.
pub type ModuleFactory = fn(&ModuleContext) -> anyhow::Result<Arc<dyn Module>>;

/// Compiled-in modules by qualified name.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `core:` modules shipped with the bot.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::modules::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, qualified_name: &str, factory: ModuleFactory) -> &mut Self {
        self.factories.insert(qualified_name.to_owned(), factory);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ModuleFactory)> {
        self.factories.iter().map(|(name, f)| (name.as_str(), *f))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// A built module and its context.
pub struct LoadedModule {
    pub module: Arc<dyn Module>,
    pub ctx: ModuleContext,
}

impl LoadedModule {
    pub async fn shutdown(&self) {
        self.ctx.cancel_all();
        self.module
            .shutdown(&self.ctx)
            .instrument(self.ctx.span().clone())
            .await;
    }
}

/// Handle for a timer or task started through a [`ModuleContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Result of [`ModuleContext::call_subprocess`].
#[derive(Debug)]
pub struct SubprocessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Default)]
struct TaskSet {
    next_id: u64,
    handles: HashMap<u64, AbortHandle>,
    closed: bool,
}

struct ContextInner {
    name: String,
    bot: Weak<Bot>,
    config: toml::Table,
    bot_config: Arc<Config>,
    span: Span,
    tasks: Mutex<TaskSet>,
}

/// What a module sees of the bot.
#[derive(Clone)]
pub struct ModuleContext {
    inner: Arc<ContextInner>,
}

impl ModuleContext {
    pub fn new(qualified_name: &str, bot: Weak<Bot>, bot_config: Arc<Config>) -> Self {
        let short = qualified_name
            .rsplit_once(':')
            .map_or(qualified_name, |(_, name)| name);
        Self {
            inner: Arc::new(ContextInner {
                name: qualified_name.to_owned(),
                bot,
                config: bot_config.module(short),
                bot_config,
                span: spans::module(qualified_name),
                tasks: Mutex::new(TaskSet::default()),
            }),
        }
    }

    /// Qualified module name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The module's `[modules.<name>]` table.
    pub fn config(&self) -> &toml::Table {
        &self.inner.config
    }

    /// The bot configuration this module was loaded with.
    pub fn bot_config(&self) -> &Arc<Config> {
        &self.inner.bot_config
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// The bot, unless it is gone.
    pub fn bot(&self) -> Option<Arc<Bot>> {
        self.inner.bot.upgrade()
    }

    fn require_bot(&self) -> BotResult<Arc<Bot>> {
        self.bot().ok_or(BotError::ShuttingDown)
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Reply in `scope`.
    pub fn say(&self, scope: &Scope, text: &str) -> Result<(), SessionError> {
        scope.reply(text)
    }

    /// Send to `target` on the named network.
    pub fn say_to(&self, network: &str, target: &str, text: &str) -> BotResult<()> {
        self.make_scope(network, target)?.reply(text)?;
        Ok(())
    }

    /// A raw scope for messages nobody asked for.
    pub fn make_scope(&self, network: &str, target: &str) -> BotResult<Scope> {
        let session = self
            .require_bot()?
            .network(network)
            .ok_or_else(|| BotError::UnknownNetwork(network.to_owned()))?;
        Ok(Scope::raw(session, target))
    }

    /// Another module's export, if it exists and has type `T`.
    pub fn export<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.bot()?.export(name)?.downcast::<T>().ok()
    }

    // ------------------------------------------------------------------
    // Timers and tasks
    // ------------------------------------------------------------------

    pub async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Run a future as a task that is aborted when the module shuts down.
    pub fn spawn<F>(&self, fut: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.inner.tasks.lock();
        let id = tasks.next_id;
        tasks.next_id += 1;
        if tasks.closed {
            debug!("module is shut down, not starting task");
            return TimerHandle(id);
        }

        let owner = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(
            async move {
                fut.await;
                if let Some(owner) = owner.upgrade() {
                    owner.tasks.lock().handles.remove(&id);
                }
            }
            .instrument(self.inner.span.clone()),
        );
        tasks.handles.insert(id, handle.abort_handle());
        TimerHandle(id)
    }

    /// Call `f` after `delay`.
    pub fn call_later<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        })
    }

    /// Cancel a timer or task. Returns `false` if it already finished.
    pub fn cancel_timeout(&self, handle: TimerHandle) -> bool {
        match self.inner.tasks.lock().handles.remove(&handle.0) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Timers and tasks still pending.
    pub fn pending(&self) -> usize {
        self.inner.tasks.lock().handles.len()
    }

    /// Abort everything and refuse new tasks.
    pub fn cancel_all(&self) {
        let mut tasks = self.inner.tasks.lock();
        tasks.closed = true;
        for (_, task) in tasks.handles.drain() {
            task.abort();
        }
    }

    // ------------------------------------------------------------------
    // Subprocesses
    // ------------------------------------------------------------------

    /// Run `program` with `args`, feed it `stdin`, and collect its output.
    pub async fn call_subprocess(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> std::io::Result<SubprocessOutput> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Write stdin concurrently so a child filling its stdout pipe
        // cannot block us.
        let input = stdin.map(<[u8]>::to_vec).unwrap_or_default();
        let writer = child.stdin.take().map(|mut pipe| {
            tokio::spawn(async move {
                let result = pipe.write_all(&input).await;
                drop(pipe);
                result
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e);
        }

        debug!(program, status = %output.status, "subprocess finished");
        Ok(SubprocessOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
