//! One network connection and its state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Registering -> Registered -> Disconnected
//! ```
//!
//! A [`NetworkSession`] outlives its connections. Each connection is a
//! spawned task that owns the framed transport and multiplexes reads,
//! outbound lines, the send-queue decay timer and the keepalive timer. The
//! session talks to it through an unbounded channel. Every connection gets
//! a new epoch so late events from a dead connection can be told apart.

use std::collections::BTreeMap;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use slirc_proto::{ChannelNamer, Message, ProtocolError, User, irc_eq};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{Instrument, Span, debug, info, warn};

use super::dispatch::{EventDispatcher, HandlerSet, ParamCount};
use super::restart::SavedNetwork;
use super::send_queue::{DECAY_INTERVAL, SendQueue};
use super::transport::{self, IrcFramed, IrcStream};
use crate::config::NetworkSettings;
use crate::error::SessionError;
use crate::telemetry::spans;

tokio::task_local! {
    /// Epoch of the connection whose message is being dispatched.
    static DISPATCH_EPOCH: u64;
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Establishing the transport.
    Connecting,
    /// Transport is up, waiting for the welcome reply.
    Registering,
    Registered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
    tls: bool,
}

impl From<&NetworkSettings> for Target {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            tls: settings.tls,
        }
    }
}

/// Requests from the session to its connection task.
enum Outbound {
    Line(Message),
    /// Flush the queue and close.
    Close,
    /// Stop and hand back the plain socket for a restart.
    Detach(oneshot::Sender<Option<Detached>>),
}

/// A socket taken out of its connection task, with the bytes that were
/// read from it but not decoded yet.
type Detached = (std::net::TcpStream, Vec<u8>);

struct Link {
    tx: mpsc::UnboundedSender<Outbound>,
    epoch: u64,
}

struct Listener {
    commands: Vec<String>,
    tx: oneshot::Sender<Result<Message, SessionError>>,
}

impl Listener {
    fn accepts(&self, msg: &Message) -> bool {
        self.commands.is_empty()
            || self
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&msg.command))
    }
}

struct SessionInner {
    settings: NetworkSettings,
    target: Target,
    /// Applied by the next connect.
    pending_target: Option<Target>,
    nick: String,
    /// Short name to long name, for channels we saw ourselves join.
    channels: BTreeMap<String, String>,
    listeners: Vec<Listener>,
    link: Option<Link>,
    epoch: u64,
}

/// A persistent session with one IRC network.
pub struct NetworkSession {
    name: String,
    namer: ChannelNamer,
    inner: Mutex<SessionInner>,
    state: watch::Sender<ConnectionState>,
    dispatcher: EventDispatcher,
    span: Span,
}

impl NetworkSession {
    /// Create a disconnected session.
    ///
    /// `delegate` handlers run after the session's own handlers for every
    /// inbound message.
    pub fn new(
        settings: NetworkSettings,
        delegate: Option<Arc<HandlerSet>>,
    ) -> Result<Arc<Self>, SessionError> {
        settings.validate()?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let span = spans::network(&settings.name);

        Ok(Arc::new(Self {
            name: settings.name.clone(),
            namer: ChannelNamer::default(),
            inner: Mutex::new(SessionInner {
                target: Target::from(&settings),
                pending_target: None,
                nick: settings.nick.clone(),
                channels: BTreeMap::new(),
                listeners: Vec::new(),
                link: None,
                epoch: 0,
                settings,
            }),
            state,
            dispatcher: EventDispatcher::new(Self::own_handlers(), delegate),
            span,
        }))
    }

    fn own_handlers() -> HandlerSet {
        let mut set = HandlerSet::new();
        set.on("NICK", ParamCount::Exact(2), |session, prefix, args| {
            session.on_nick(prefix, &args[0]);
        })
        .on("JOIN", ParamCount::Exact(2), |session, prefix, args| {
            session.on_join(prefix, &args[0]);
        })
        .on("PING", ParamCount::AtLeast(1), |session, _, args| {
            if let Err(e) = session.send(Message::pong(args.iter().cloned())) {
                debug!(error = %e, "could not answer PING");
            }
        });
        set
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn namer(&self) -> ChannelNamer {
        self.namer
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Current nick; may differ from the configured one after a collision.
    pub fn nick(&self) -> String {
        self.inner.lock().nick.clone()
    }

    /// Host of the current (or last) connection.
    pub fn host(&self) -> String {
        self.inner.lock().target.host.clone()
    }

    pub fn port(&self) -> u16 {
        self.inner.lock().target.port
    }

    /// The configured settings.
    pub fn settings(&self) -> NetworkSettings {
        self.inner.lock().settings.clone()
    }

    pub fn ping_interval(&self) -> Duration {
        self.inner.lock().settings.ping
    }

    /// Joined channels, short name to long name.
    pub fn channels(&self) -> BTreeMap<String, String> {
        self.inner.lock().channels.clone()
    }

    /// True if `channel`, in short or long form, is joined.
    pub fn is_joined(&self, channel: &str) -> bool {
        let inner = self.inner.lock();
        self.has_channel(&inner.channels, channel)
    }

    fn has_channel(&self, channels: &BTreeMap<String, String>, channel: &str) -> bool {
        channels
            .values()
            .any(|long| self.namer.channel_matches(long, channel))
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Queue a message on the current connection.
    pub fn send(&self, msg: Message) -> Result<(), SessionError> {
        let inner = self.inner.lock();
        let link = inner.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.tx
            .send(Outbound::Line(msg))
            .map_err(|_| SessionError::Disconnected)
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), SessionError> {
        self.send(Message::privmsg(target, text))
    }

    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<(), SessionError> {
        self.send(Message::join(channel, key))
    }

    pub fn part(&self, channel: &str, message: Option<&str>) -> Result<(), SessionError> {
        self.send(Message::part(channel, message))
    }

    /// Ask the server for a new nick.
    pub fn change_nick(&self, nick: &str) -> Result<(), SessionError> {
        self.send(Message::nick(nick))
    }

    /// Send QUIT and close once it has been written.
    pub fn quit(&self, message: Option<&str>) -> Result<(), SessionError> {
        self.send(Message::quit(message))?;
        self.disconnect();
        Ok(())
    }

    /// Close the transport. The disconnect path runs when the connection
    /// task has finished.
    pub fn disconnect(&self) {
        if let Some(link) = &self.inner.lock().link {
            let _ = link.tx.send(Outbound::Close);
        }
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    fn listen(&self, commands: &[&str]) -> oneshot::Receiver<Result<Message, SessionError>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if inner.link.is_none() {
            let _ = tx.send(Err(SessionError::NotConnected));
        } else {
            inner.listeners.push(Listener {
                commands: commands.iter().map(|c| (*c).to_owned()).collect(),
                tx,
            });
        }
        rx
    }

    /// Wait for the next message with one of `commands`; any message if
    /// `commands` is empty.
    ///
    /// Fails with [`SessionError::Disconnected`] if the connection is lost
    /// first.
    pub async fn wait_for_message(&self, commands: &[&str]) -> Result<Message, SessionError> {
        self.listen(commands)
            .await
            .unwrap_or(Err(SessionError::Disconnected))
    }

    /// Resolve once the session is disconnected.
    pub async fn wait_for_disconnect(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    // ------------------------------------------------------------------
    // Connecting
    // ------------------------------------------------------------------

    /// Connect and register.
    ///
    /// Returns once the server sent the welcome reply. Dropping the future
    /// closes whatever part of the connection was already established.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        let target = {
            let mut inner = self.inner.lock();
            if self.state() != ConnectionState::Disconnected {
                return Err(SessionError::AlreadyConnecting);
            }
            if let Some(target) = inner.pending_target.take() {
                inner.target = target;
            }
            self.state.send_replace(ConnectionState::Connecting);
            inner.target.clone()
        };

        let mut guard = ConnectGuard {
            session: self,
            armed: true,
        };

        info!(host = %target.host, port = target.port, tls = target.tls, "connecting");
        let stream = transport::connect(&target.host, target.port, target.tls).await?;
        let epoch = self.attach(stream, ConnectionState::Registering, &[]);
        self.register(epoch).await?;

        guard.armed = false;
        Ok(())
    }

    async fn register(&self, epoch: u64) -> Result<(), SessionError> {
        let settings = self.settings();
        debug!("registering connection");

        if let Some(password) = &settings.password {
            self.send(Message::pass(password.as_str()))?;
        }

        let mut user_sent = false;
        loop {
            let reply = self.listen(&["001", "433"]);
            self.send(Message::nick(self.nick()))?;
            if !user_sent {
                self.send(Message::user(
                    settings.username.as_str(),
                    "8",
                    settings.realname.as_str(),
                ))?;
                user_sent = true;
            }

            let msg = reply.await.unwrap_or(Err(SessionError::Disconnected))?;
            if msg.command == "001" {
                return self.promote(epoch);
            }

            let mut inner = self.inner.lock();
            inner.nick.push('_');
            info!(nick = %inner.nick, "nickname in use, retrying");
        }
    }

    fn promote(&self, epoch: u64) -> Result<(), SessionError> {
        let inner = self.inner.lock();
        let current = inner.link.as_ref().map(|l| l.epoch);
        if current != Some(epoch) || self.state() != ConnectionState::Registering {
            return Err(SessionError::Disconnected);
        }
        self.state.send_replace(ConnectionState::Registered);
        info!(nick = %inner.nick, "registered");
        Ok(())
    }

    fn abort_connect(&self) {
        let mut inner = self.inner.lock();
        if !matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Registering
        ) {
            return;
        }
        if let Some(link) = inner.link.take() {
            let _ = link.tx.send(Outbound::Close);
        }
        debug!("connection attempt abandoned");
        self.teardown(&mut inner);
    }

    /// Resume a connection inherited from the previous process.
    ///
    /// The session starts out registered with the saved identity and
    /// channels, then the configured settings are applied on top.
    pub fn resume(
        self: &Arc<Self>,
        mut saved: SavedNetwork,
        stream: IrcStream,
    ) -> Result<(), SessionError> {
        let unread = std::mem::take(&mut saved.unread);
        {
            let mut inner = self.inner.lock();
            if self.state() != ConnectionState::Disconnected {
                return Err(SessionError::AlreadyConnecting);
            }
            inner.target = Target {
                host: saved.host,
                port: saved.port,
                tls: false,
            };
            inner.pending_target = None;
            inner.nick = saved.nick;
            inner.channels = saved.channels;
            if saved.password.is_some() {
                inner.settings.password = saved.password;
            }
        }

        self.attach(stream, ConnectionState::Registered, &unread);
        info!(nick = %self.nick(), channels = self.channels().len(), "resumed connection");

        self.reconfigure(self.settings())
    }

    /// Apply new settings to the live session.
    ///
    /// A different server is recorded for the next connect and the
    /// current connection is closed. A different nick alone is requested
    /// with NICK; the current nick follows when the server confirms it.
    /// Configured channels that are not joined yet are joined.
    pub fn reconfigure(&self, settings: NetworkSettings) -> Result<(), SessionError> {
        settings.validate()?;
        let target = Target::from(&settings);

        let joins: Vec<String> = {
            let mut inner = self.inner.lock();
            inner.settings = settings;

            if inner.target != target {
                info!(host = %target.host, port = target.port, "server changed, reconnecting");
                inner.pending_target = Some(target);
                inner.nick = inner.settings.nick.clone();
                if let Some(link) = &inner.link {
                    let _ = link.tx.send(Outbound::Close);
                }
                return Ok(());
            }
            inner.pending_target = None;

            if inner.nick != inner.settings.nick {
                let wanted = inner.settings.nick.clone();
                // Once registered the nick only changes when the server
                // echoes our NICK back; until then the old one is ours.
                if self.state() != ConnectionState::Registered {
                    inner.nick = wanted.clone();
                }
                if let Some(link) = &inner.link {
                    let _ = link.tx.send(Outbound::Line(Message::nick(wanted)));
                }
            }

            if self.state() != ConnectionState::Registered {
                return Ok(());
            }
            inner
                .settings
                .channels
                .iter()
                .filter(|c| !self.has_channel(&inner.channels, c))
                .cloned()
                .collect()
        };

        // Channels are never parted here; some may have been joined by hand.
        for channel in joins {
            self.join(&channel, None)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Restart handover
    // ------------------------------------------------------------------

    /// Stop the connection task and take the socket, marked inheritable.
    ///
    /// Returns `None` for sessions that cannot be handed over: not
    /// registered, or running over TLS.
    pub async fn detach_for_restart(
        self: &Arc<Self>,
    ) -> Result<Option<(SavedNetwork, std::net::TcpStream)>, SessionError> {
        let (tx, rx) = oneshot::channel();
        {
            let inner = self.inner.lock();
            if self.state() != ConnectionState::Registered {
                return Ok(None);
            }
            let Some(link) = &inner.link else {
                return Ok(None);
            };
            if inner.target.tls {
                warn!("TLS session state cannot be handed over; will reconnect after restart");
                return Ok(None);
            }
            link.tx
                .send(Outbound::Detach(tx))
                .map_err(|_| SessionError::Disconnected)?;
        }

        let Some((stream, unread)) = rx.await.map_err(|_| SessionError::Disconnected)? else {
            return Ok(None);
        };
        self.inner.lock().link = None;

        if let Err(e) = transport::make_inheritable(&stream) {
            self.reattach(stream, &unread)?;
            return Err(e.into());
        }

        let inner = self.inner.lock();
        let saved = SavedNetwork {
            host: inner.target.host.clone(),
            port: inner.target.port,
            fd: stream.as_raw_fd(),
            nick: inner.nick.clone(),
            channels: inner.channels.clone(),
            password: inner.settings.password.clone(),
            unread,
        };
        Ok(Some((saved, stream)))
    }

    /// Take a detached socket back after a failed restart. `unread` is
    /// what [`detach_for_restart`](Self::detach_for_restart) saved with it.
    pub fn reattach(
        self: &Arc<Self>,
        stream: std::net::TcpStream,
        unread: &[u8],
    ) -> Result<(), SessionError> {
        match transport::adopt_stream(stream) {
            Ok(stream) => {
                self.attach(stream, ConnectionState::Registered, unread);
                info!("reattached connection");
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                self.teardown(&mut inner);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Connection task plumbing
    // ------------------------------------------------------------------

    fn attach(self: &Arc<Self>, stream: IrcStream, state: ConnectionState, unread: &[u8]) -> u64 {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            let epoch = inner.epoch;
            inner.link = Some(Link { tx, epoch });
            self.state.send_replace(state);
            epoch
        };

        tokio::spawn(
            run_connection(Arc::clone(self), stream.framed(unread), rx, epoch)
                .instrument(self.span.clone()),
        );
        epoch
    }

    /// Fulfil waiting listeners, then hand the message to the handlers.
    fn process_message(self: &Arc<Self>, msg: Message, epoch: u64) {
        let ready = {
            let mut inner = self.inner.lock();
            let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.listeners)
                .into_iter()
                .partition(|l| l.accepts(&msg));
            inner.listeners = pending.into_iter().filter(|l| !l.tx.is_closed()).collect();
            ready
        };
        for listener in ready {
            let _ = listener.tx.send(Ok(msg.clone()));
        }

        let session = Arc::clone(self);
        tokio::spawn(
            async move {
                DISPATCH_EPOCH.sync_scope(epoch, || session.dispatcher.dispatch(&session, &msg));
            }
            .instrument(self.span.clone()),
        );
    }

    /// Runs when the connection task for `epoch` has ended.
    fn handle_disconnect(&self, epoch: u64, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.link.as_ref().map(|l| l.epoch) != Some(epoch) {
            return;
        }
        inner.link = None;
        self.teardown(&mut inner);
        info!(reason, "disconnected");
    }

    fn teardown(&self, inner: &mut SessionInner) {
        inner.channels.clear();
        for listener in inner.listeners.drain(..) {
            let _ = listener.tx.send(Err(SessionError::Disconnected));
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Whether the message being dispatched belongs to the live connection.
    fn dispatching_current(&self, inner: &SessionInner) -> bool {
        let live = inner.link.as_ref().map(|l| l.epoch);
        match DISPATCH_EPOCH.try_with(|epoch| *epoch) {
            Ok(epoch) => live == Some(epoch),
            Err(_) => live.is_some(),
        }
    }

    fn on_nick(&self, prefix: Option<&str>, new_nick: &str) {
        let Some(user) = prefix.and_then(|p| p.parse::<User>().ok()) else {
            return;
        };
        let mut inner = self.inner.lock();
        if self.dispatching_current(&inner) && irc_eq(&user.nick, &inner.nick) {
            debug!(nick = %new_nick, "nick changed");
            inner.nick = new_nick.to_owned();
        }
    }

    fn on_join(&self, prefix: Option<&str>, channel: &str) {
        let Some(user) = prefix.and_then(|p| p.parse::<User>().ok()) else {
            return;
        };
        let mut inner = self.inner.lock();
        if self.dispatching_current(&inner) && irc_eq(&user.nick, &inner.nick) {
            debug!(channel = %channel, "joined channel");
            let (short, long) = self.namer.parse_channel_name(channel);
            inner.channels.insert(short, long);
        }
    }
}

/// Closes a half-established connection when `connect` does not finish.
struct ConnectGuard<'a> {
    session: &'a NetworkSession,
    armed: bool,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abort_connect();
        }
    }
}

enum SelectResult {
    /// A message from the server (boxed to keep the enum small)
    Inbound(Box<Message>),
    /// A message to send
    Outbound(Message),
    /// Send-queue decay tick
    Decay,
    /// The connection has been idle for a full ping interval
    Keepalive,
    /// Local close request
    Close,
    /// Hand the socket over for a restart
    Detach(oneshot::Sender<Option<Detached>>),
    /// Read side ended
    Lost(String),
}

async fn write(framed: &mut IrcFramed, msg: Message) -> Result<(), ProtocolError> {
    debug!(">>> {}", msg.to_string().trim_end());
    framed.send(msg).await
}

async fn write_all(framed: &mut IrcFramed, msgs: Vec<Message>) -> Result<(), ProtocolError> {
    for msg in msgs {
        write(framed, msg).await?;
    }
    Ok(())
}

/// Take the plain socket out of `framed` together with whatever was read
/// but not decoded yet: complete lines still queued in the codec buffer and
/// the start of a partial one. `None` for TLS.
fn hand_over(framed: IrcFramed) -> std::io::Result<Option<Detached>> {
    let parts = framed.into_parts();
    let unread = parts.read_buf.to_vec();
    let IrcStream::Plain(tcp) = parts.io else {
        return Ok(None);
    };
    if !unread.is_empty() {
        debug!(bytes = unread.len(), "carrying unread input across handover");
    }
    Ok(Some((tcp.into_std()?, unread)))
}

async fn run_connection(
    session: Arc<NetworkSession>,
    mut framed: IrcFramed,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    epoch: u64,
) {
    let mut queue = SendQueue::default();
    let mut decay = interval_at(Instant::now() + DECAY_INTERVAL, DECAY_INTERVAL);
    decay.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let keepalive = sleep_until(Instant::now() + session.ping_interval());
    tokio::pin!(keepalive);

    let reason = loop {
        let result = tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(msg)) => SelectResult::Inbound(Box::new(msg)),
                Some(Err(e)) => SelectResult::Lost(e.to_string()),
                None => SelectResult::Lost("connection closed by server".to_owned()),
            },
            request = outbound.recv() => match request {
                Some(Outbound::Line(msg)) => SelectResult::Outbound(msg),
                Some(Outbound::Detach(reply)) => SelectResult::Detach(reply),
                Some(Outbound::Close) | None => SelectResult::Close,
            },
            _ = decay.tick() => SelectResult::Decay,
            () = &mut keepalive => SelectResult::Keepalive,
        };

        match result {
            SelectResult::Inbound(msg) => {
                debug!("<<< {}", msg.to_string().trim_end());
                keepalive
                    .as_mut()
                    .reset(Instant::now() + session.ping_interval());
                session.process_message(*msg, epoch);
            }
            SelectResult::Outbound(msg) => {
                if let Some(msg) = queue.push(msg)
                    && let Err(e) = write(&mut framed, msg).await
                {
                    break e.to_string();
                }
            }
            SelectResult::Decay => {
                if let Err(e) = write_all(&mut framed, queue.decay()).await {
                    break e.to_string();
                }
            }
            SelectResult::Keepalive => {
                keepalive
                    .as_mut()
                    .reset(Instant::now() + session.ping_interval());
                if session.state() == ConnectionState::Registered
                    && let Some(ping) = queue.push(Message::ping(session.host()))
                    && let Err(e) = write(&mut framed, ping).await
                {
                    break e.to_string();
                }
            }
            SelectResult::Close => {
                if let Err(e) = write_all(&mut framed, queue.drain_all()).await {
                    break e.to_string();
                }
                break "closed locally".to_owned();
            }
            SelectResult::Detach(reply) => {
                if framed.get_ref().is_tls() {
                    let _ = reply.send(None);
                    continue;
                }
                if let Err(e) = write_all(&mut framed, queue.drain_all()).await {
                    let _ = reply.send(None);
                    break e.to_string();
                }
                match hand_over(framed) {
                    Ok(detached) => {
                        if reply.send(detached).is_err() {
                            break "handover abandoned".to_owned();
                        }
                        debug!("connection detached for restart");
                        return;
                    }
                    Err(e) => {
                        let _ = reply.send(None);
                        break e.to_string();
                    }
                }
            }
            SelectResult::Lost(reason) => break reason,
        }
    };

    session.handle_disconnect(epoch, &reason);
}
