//! Integration tests for a single network session: registration,
//! membership tracking, keepalive and disconnects.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{STEP, TestServer, eventually};
use slirc_bot::error::SessionError;
use slirc_bot::network::{ConnectionState, HandlerSet, ParamCount};
use tokio::time::timeout;

#[tokio::test]
async fn test_registration_retries_taken_nick() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };

    let mut conn = server.accept().await.unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().args, ["bot"]);
    let user = conn.expect("USER").await.unwrap();
    assert_eq!(user.args, ["bot", "8", "*", "Test Bot"]);

    conn.send_raw(":irc.test 433 * bot :Nickname is already in use")
        .await
        .unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().args, ["bot_"]);
    conn.send_raw(":irc.test 433 * bot_ :Nickname is already in use")
        .await
        .unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().args, ["bot__"]);
    conn.send_raw(":irc.test 001 bot__ :Welcome").await.unwrap();

    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();
    assert_eq!(session.state(), ConnectionState::Registered);
    assert_eq!(session.nick(), "bot__");

    conn.send_raw(":bot__!bot@localhost JOIN #test").await.unwrap();
    assert!(eventually(|| session.channels().contains_key("#test")).await);
    assert!(session.is_joined("#test"));

    drop(conn);
    timeout(STEP, session.wait_for_disconnect()).await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.channels().is_empty());
}

#[tokio::test]
async fn test_password_goes_first() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("password = \"sekrit\"", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };

    let mut conn = server.accept().await.unwrap();
    let first = conn.recv().await.unwrap();
    assert_eq!(first.command, "PASS");
    assert_eq!(first.args, ["sekrit"]);
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_close_during_registration_fails_connect() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };

    let mut conn = server.accept().await.unwrap();
    conn.expect("USER").await.unwrap();
    drop(conn);

    let result = timeout(STEP, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(SessionError::Disconnected)));
    assert!(eventually(|| session.state() == ConnectionState::Disconnected).await);
}

#[tokio::test]
async fn test_connect_refused() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);
    drop(server);

    let result = timeout(STEP, session.connect()).await.unwrap();
    assert!(matches!(result, Err(SessionError::Io(_))));
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_send_requires_connection() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    assert!(matches!(
        session.privmsg("#test", "hello"),
        Err(SessionError::NotConnected)
    ));
    assert!(matches!(
        session.wait_for_message(&[]).await,
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_ping_is_answered_and_keepalive_sent() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("ping = 1", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    conn.send_raw("PING :irc.test").await.unwrap();
    let pong = conn.expect("PONG").await.unwrap();
    assert_eq!(pong.args, ["irc.test"]);

    // Nothing arrives for a full interval, so the bot pings the server.
    let ping = conn.expect("PING").await.unwrap();
    assert_eq!(ping.args, ["127.0.0.1"]);

    session.quit(Some("bye")).unwrap();
    let quit = conn.expect("QUIT").await.unwrap();
    assert_eq!(quit.args, ["bye"]);
    assert!(conn.closed().await);
    timeout(STEP, session.wait_for_disconnect()).await.unwrap();
}

#[tokio::test]
async fn test_wait_for_message_filters_commands() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    let waiting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.wait_for_message(&["NOTICE"]).await })
    };
    // Give the listener time to register before anything arrives.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    conn.send_raw(":irc.test 002 bot :Your host").await.unwrap();
    conn.send_raw(":irc.test NOTICE bot :hello").await.unwrap();

    let msg = timeout(STEP, waiting).await.unwrap().unwrap().unwrap();
    assert_eq!(msg.command, "NOTICE");
    assert_eq!(msg.trailing(), Some("hello"));

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.wait_for_message(&["NOTICE"]).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drop(conn);
    let result = timeout(STEP, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(SessionError::Disconnected)));
}

#[tokio::test]
async fn test_delegate_handlers_check_parameter_count() {
    let server = TestServer::bind().await.unwrap();
    let privmsgs = Arc::new(AtomicUsize::new(0));
    let replies = Arc::new(AtomicUsize::new(0));

    let mut handlers = HandlerSet::new();
    {
        let privmsgs = Arc::clone(&privmsgs);
        handlers.on("PRIVMSG", ParamCount::Exact(3), move |_, prefix, args| {
            assert_eq!(prefix, Some("alice!a@example.org"));
            assert_eq!(args[1], "hi there");
            privmsgs.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let replies = Arc::clone(&replies);
        handlers.on_reply(move |_, _| {
            replies.fetch_add(1, Ordering::SeqCst);
        });
    }
    let session = server.session("", Some(Arc::new(handlers)));

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    conn.send_raw(":alice!a@example.org PRIVMSG #test :hi there")
        .await
        .unwrap();
    conn.send_raw(":alice!a@example.org PRIVMSG #test").await.unwrap();
    conn.send_raw(":irc.test 002 bot :Your host").await.unwrap();

    assert!(eventually(|| replies.load(Ordering::SeqCst) == 2).await);
    assert!(eventually(|| privmsgs.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(privmsgs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reconfigure_changes_nick_and_joins_channels() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    let settings = server.settings("nick = \"other\"\nchannels = [\"#new\"]");
    session.reconfigure(settings).unwrap();

    assert_eq!(conn.expect("NICK").await.unwrap().args, ["other"]);
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#new"]);
    assert_eq!(session.nick(), "bot");

    conn.send_raw(":bot!bot@localhost NICK other").await.unwrap();
    assert!(eventually(|| session.nick() == "other").await);

    conn.send_raw(":other!bot@localhost NICK renamed").await.unwrap();
    assert!(eventually(|| session.nick() == "renamed").await);
}

#[tokio::test]
async fn test_rejected_nick_change_keeps_tracking_own_joins() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    session.reconfigure(server.settings("nick = \"other\"")).unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().args, ["other"]);
    conn.send_raw(":irc.test 433 bot other :Nickname is already in use")
        .await
        .unwrap();

    conn.send_raw(":bot!bot@localhost JOIN #x").await.unwrap();
    assert!(eventually(|| session.is_joined("#x")).await);
    assert_eq!(session.nick(), "bot");
}

#[tokio::test]
async fn test_reconfigure_rejects_invalid_settings_on_live_session() {
    let server = TestServer::bind().await.unwrap();
    let session = server.session("", None);

    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect().await })
    };
    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    timeout(STEP, connecting).await.unwrap().unwrap().unwrap();

    let mut settings = server.settings("");
    settings.host = String::new();
    let err = session.reconfigure(settings).unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.state(), ConnectionState::Registered);
    assert_eq!(session.host(), "127.0.0.1");

    conn.send_raw("PING :still").await.unwrap();
    assert_eq!(conn.expect("PONG").await.unwrap().args, ["still"]);
}
