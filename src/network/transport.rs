//! Client transport: plain TCP, TLS, or an inherited socket.

use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use slirc_proto::{IrcCodec, Message};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_util::codec::{Framed, FramedParts};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// A framed IRC connection.
pub type IrcFramed = Framed<IrcStream, IrcCodec>;

/// The byte stream under a connection.
pub enum IrcStream {
    /// Plain TCP, either dialed or inherited across a restart.
    Plain(TcpStream),
    /// Client-side TLS (boxed for size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl IrcStream {
    /// True for TLS connections.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Descriptor of the underlying socket.
    pub fn raw_fd(&self) -> RawFd {
        match self {
            Self::Plain(s) => s.as_raw_fd(),
            Self::Tls(s) => s.get_ref().0.as_raw_fd(),
        }
    }

    /// Wrap in the IRC line codec. `unread` holds bytes taken off this
    /// socket earlier; they are decoded before anything new is read.
    pub fn framed(self, unread: &[u8]) -> IrcFramed {
        let mut parts = FramedParts::new::<Message>(self, IrcCodec::new());
        parts.read_buf = BytesMut::from(unread);
        Framed::from_parts(parts)
    }
}

impl AsyncRead for IrcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_read(cx, buf),
            Self::Tls(inner) => Pin::new(inner.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IrcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_write(cx, buf),
            Self::Tls(inner) => Pin::new(inner.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_flush(cx),
            Self::Tls(inner) => Pin::new(inner.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_shutdown(cx),
            Self::Tls(inner) => Pin::new(inner.as_mut()).poll_shutdown(cx),
        }
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Dial `host:port`, optionally upgrading to TLS.
pub async fn connect(host: &str, port: u16, tls: bool) -> Result<IrcStream, SessionError> {
    let stream = TcpStream::connect((host, port)).await?;
    if let Err(e) = enable_keepalive(&stream) {
        warn!(error = %e, "failed to enable TCP keepalive");
    }
    debug!(host = %host, port, "TCP connection established");

    if tls {
        let tls_stream = upgrade_to_tls(stream, host).await?;
        Ok(IrcStream::Tls(Box::new(tls_stream)))
    } else {
        Ok(IrcStream::Plain(stream))
    }
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &certs.errors {
        warn!("Error loading native certs: {}", e);
    }
    roots
}

/// Upgrades a TCP stream to TLS, verifying against the system roots.
pub async fn upgrade_to_tls(
    tcp_stream: TcpStream,
    hostname: &str,
) -> Result<TlsStream<TcpStream>, SessionError> {
    let config = ClientConfig::builder()
        .with_root_certificates(native_roots())
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|e| SessionError::Tls(format!("invalid server name {hostname}: {e}")))?;

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| SessionError::Tls(e.to_string()))?;

    info!(hostname = %hostname, "TLS handshake completed");
    Ok(tls_stream)
}

/// Take ownership of a connected socket inherited from the previous process.
///
/// The descriptor gets close-on-exec again so it is not leaked into child
/// processes; it is checked to be a connected socket before use.
pub fn adopt_fd(fd: RawFd) -> Result<IrcStream, SessionError> {
    #[allow(unsafe_code)]
    // SAFETY: the descriptor number comes from the state file written by
    // the process we replaced, which kept it open across exec and gave up
    // ownership. Nothing else in this process refers to it.
    let std_stream = unsafe {
        use std::os::fd::FromRawFd;
        std::net::TcpStream::from_raw_fd(fd)
    };

    adopt_stream(std_stream)
}

/// Register a blocking-mode std socket with the runtime.
pub fn adopt_stream(std_stream: std::net::TcpStream) -> Result<IrcStream, SessionError> {
    let sock = SockRef::from(&std_stream);
    sock.set_cloexec(true)?;
    let peer = std_stream.peer_addr()?;
    std_stream.set_nonblocking(true)?;

    let stream = TcpStream::from_std(std_stream)?;
    debug!(peer = %peer, "adopted existing connection");
    Ok(IrcStream::Plain(stream))
}

/// Mark a socket to survive `exec`.
pub fn make_inheritable(stream: &std::net::TcpStream) -> std::io::Result<()> {
    SockRef::from(stream).set_cloexec(false)
}
