//! Integration test common infrastructure.
//!
//! A scripted IRC server: tests accept the bot's connection and then read
//! and write raw lines, asserting on what the bot sends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use slirc_bot::Config;
use slirc_bot::config::NetworkSettings;
use slirc_bot::network::{HandlerSet, NetworkSession};
use slirc_proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// How long any single step may take. Lines held back by the send queue
/// are released every two seconds, so this leaves room for a few ticks.
pub const STEP: Duration = Duration::from_secs(10);

/// A listening fake server.
pub struct TestServer {
    listener: TcpListener,
}

impl TestServer {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .expect("listener has an address")
            .port()
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<ServerConn> {
        let (stream, _) = timeout(STEP, self.listener.accept()).await??;
        Ok(ServerConn::new(stream))
    }

    /// Config text for one network called `test` pointing at this server.
    pub fn config_toml(&self, extra_global: &str, extra_network: &str) -> String {
        format!(
            "nick = \"bot\"\nusername = \"bot\"\nrealname = \"Test Bot\"\n{extra_global}\n\
             [networks.test]\nserver = \"127.0.0.1\"\nport = {}\n{extra_network}\n",
            self.port()
        )
    }

    pub fn config(&self, extra_global: &str, extra_network: &str) -> Config {
        toml::from_str(&self.config_toml(extra_global, extra_network)).expect("valid test config")
    }

    pub fn settings(&self, extra_network: &str) -> NetworkSettings {
        self.config("", extra_network)
            .network("test")
            .expect("network is configured")
    }

    /// A disconnected session for the `test` network.
    pub fn session(
        &self,
        extra_network: &str,
        delegate: Option<Arc<HandlerSet>>,
    ) -> Arc<NetworkSession> {
        NetworkSession::new(self.settings(extra_network), delegate).expect("valid settings")
    }
}

/// The server side of one accepted connection.
pub struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl ServerConn {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        }
    }

    /// Send one raw line; CRLF is appended.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive the next message from the bot.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(STEP, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("connection closed");
        }
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("parse error: {e}"))
    }

    /// Receive until a message with `command` arrives, skipping others.
    pub async fn expect(&mut self, command: &str) -> anyhow::Result<Message> {
        loop {
            let msg = self.recv().await?;
            if msg.command.eq_ignore_ascii_case(command) {
                return Ok(msg);
            }
        }
    }

    /// True once the bot has closed its side.
    pub async fn closed(&mut self) -> bool {
        let mut line = String::new();
        loop {
            line.clear();
            match timeout(STEP, self.reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Play the server side of registration: read NICK and USER, then
    /// welcome `nick`.
    pub async fn register(&mut self, nick: &str) -> anyhow::Result<()> {
        let first = self.expect("NICK").await?;
        anyhow::ensure!(first.args == [nick], "unexpected nick: {:?}", first.args);
        self.expect("USER").await?;
        self.send_raw(&format!(":irc.test 001 {nick} :Welcome to the test network"))
            .await
    }
}

/// Poll `check` until it holds or the step timeout passes.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
