//! Integration tests for the reconnect loop and the restart handover.

mod common;

use std::collections::BTreeMap;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::sync::Arc;

use common::{STEP, ServerConn, TestServer, eventually};
use slirc_bot::network::{ConnectionState, NetworkSession, SavedNetwork, supervisor};
use tokio::time::timeout;

#[tokio::test]
async fn test_reconnects_and_rejoins_configured_channels() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("channels = [\"#one\", \"#two\"]", None);
    let task = supervisor::spawn(session.clone(), None);

    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#one"]);
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#two"]);
    conn.send_raw(":bot!bot@localhost JOIN #one").await.unwrap();
    assert!(eventually(|| session.is_joined("#one")).await);

    drop(conn);

    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#one"]);
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#two"]);
    assert!(eventually(|| session.state() == ConnectionState::Registered).await);

    task.abort();
}

#[tokio::test]
async fn test_abort_cancels_connect_in_progress() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);
    let task = supervisor::spawn(session.clone(), None);

    let mut conn = server.accept().await.unwrap();
    conn.expect("USER").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Registering);

    task.abort();
    assert!(conn.closed().await);
    timeout(STEP, session.wait_for_disconnect()).await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_resumes_inherited_connection() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("channels = [\"#kept\", \"#other\"]", None);

    let (conn, client) = tokio::join!(
        server.accept(),
        tokio::net::TcpStream::connect(("127.0.0.1", server.port()))
    );
    let mut conn = conn.unwrap();
    let fd = client.unwrap().into_std().unwrap().into_raw_fd();

    let saved = SavedNetwork {
        host: "127.0.0.1".to_owned(),
        port: server.port(),
        fd,
        nick: "bot_".to_owned(),
        channels: BTreeMap::from([("#kept".to_owned(), "#kept".to_owned())]),
        password: None,
        unread: Vec::new(),
    };
    let task = supervisor::spawn(session.clone(), Some(saved));

    // Registered straight away; the configured nick is requested and only
    // the missing channel is joined.
    assert!(eventually(|| session.state() == ConnectionState::Registered).await);
    assert!(session.is_joined("#kept"));
    assert_eq!(conn.expect("NICK").await.unwrap().args, ["bot"]);
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#other"]);

    // Nothing else is queued ahead of the reply: #other is asked for once.
    conn.send_raw("PING :still-here").await.unwrap();
    let next = conn.recv().await.unwrap();
    assert_eq!(next.command, "PONG");
    assert_eq!(next.args, ["still-here"]);

    task.abort();
}

#[tokio::test]
async fn test_resume_replays_unread_input() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let (conn, client) = tokio::join!(
        server.accept(),
        tokio::net::TcpStream::connect(("127.0.0.1", server.port()))
    );
    let mut conn = conn.unwrap();
    let fd = client.unwrap().into_std().unwrap().into_raw_fd();

    let saved = SavedNetwork {
        host: "127.0.0.1".to_owned(),
        port: server.port(),
        fd,
        nick: "bot".to_owned(),
        channels: BTreeMap::new(),
        password: None,
        unread: b"PING :a\r\nPING :b\r\n".to_vec(),
    };
    let task = supervisor::spawn(session.clone(), Some(saved));

    assert_eq!(conn.expect("PONG").await.unwrap().args, ["a"]);
    assert_eq!(conn.expect("PONG").await.unwrap().args, ["b"]);

    task.abort();
}

/// Whether `fd` would be closed by exec.
#[cfg(target_os = "linux")]
fn close_on_exec(fd: RawFd) -> bool {
    let info = std::fs::read_to_string(format!("/proc/self/fdinfo/{fd}")).unwrap();
    let flags = info
        .lines()
        .find_map(|line| line.strip_prefix("flags:"))
        .unwrap()
        .trim();
    u32::from_str_radix(flags, 8).unwrap() & 0o2000000 != 0
}

async fn registered(server: &TestServer) -> (Arc<NetworkSession>, ServerConn) {
    let session = server.session("", None);
    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();
    (session, conn)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_detached_connection_survives_into_new_session() {
    let server = TestServer::bind().await.unwrap();
    let (session, mut conn) = registered(&server).await;
    conn.send_raw(":bot!bot@localhost JOIN #a").await.unwrap();
    assert!(eventually(|| session.is_joined("#a")).await);

    let (saved, stream) = session.detach_for_restart().await.unwrap().unwrap();
    assert_eq!(saved.host, "127.0.0.1");
    assert_eq!(saved.port, server.port());
    assert_eq!(saved.nick, "bot");
    assert!(saved.channels.contains_key("#a"));
    assert_eq!(saved.password, None);
    assert_eq!(saved.fd, stream.as_raw_fd());
    assert!(!close_on_exec(saved.fd));

    let _ = stream.into_raw_fd();
    let fresh = server.session("", None);
    let task = supervisor::spawn(fresh.clone(), Some(saved));
    assert!(eventually(|| fresh.state() == ConnectionState::Registered).await);
    assert!(fresh.is_joined("#a"));

    conn.send_raw("PING :after").await.unwrap();
    assert_eq!(conn.expect("PONG").await.unwrap().args, ["after"]);

    task.abort();
}

#[tokio::test]
async fn test_detach_needs_registered_session() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);
    assert!(session.detach_for_restart().await.unwrap().is_none());
}

#[tokio::test]
async fn test_reattach_after_detach() {
    let server = TestServer::bind().await.unwrap();
    let (session, mut conn) = registered(&server).await;

    let (saved, stream) = session.detach_for_restart().await.unwrap().unwrap();
    session.reattach(stream, &saved.unread).unwrap();
    assert_eq!(session.state(), ConnectionState::Registered);

    conn.send_raw("PING :back").await.unwrap();
    assert_eq!(conn.expect("PONG").await.unwrap().args, ["back"]);
}
