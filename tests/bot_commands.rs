//! Integration tests for the bot: command dispatch, permissions, reload,
//! restart and shutdown against a scripted server.

mod common;

use std::sync::Arc;

use common::{ServerConn, TestServer};
use slirc_bot::bot::ModuleRegistry;
use slirc_bot::network::{ConnectionState, StateFile};
use slirc_bot::{Bot, BotError};
use slirc_proto::Message;

const ADMINS: &str = "admins = [\"admin!*@*\"]";

async fn start_bot(server: &TestServer, path: &std::path::Path) -> (Arc<Bot>, ServerConn) {
    start_bot_with(server, path, ADMINS).await
}

async fn start_bot_with(
    server: &TestServer,
    path: &std::path::Path,
    global: &str,
) -> (Arc<Bot>, ServerConn) {
    let text = server.config_toml(global, "");
    std::fs::write(path, &text).unwrap();
    let config = toml::from_str(&text).unwrap();

    let bot = Bot::new(path, config, ModuleRegistry::with_builtins(), None, None);
    bot.start().await.unwrap();

    let mut conn = server.accept().await.unwrap();
    conn.register("bot").await.unwrap();
    (bot, conn)
}

/// Next PRIVMSG from the bot as `(target, text)`.
async fn reply(conn: &mut ServerConn) -> (String, String) {
    let msg: Message = conn.expect("PRIVMSG").await.unwrap();
    (msg.args[0].clone(), msg.args[1].clone())
}

fn pair(target: &str, text: &str) -> (String, String) {
    (target.to_owned(), text.to_owned())
}

#[tokio::test]
async fn test_help_depends_on_permissions() {
    let server = TestServer::bind().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (bot, mut conn) = start_bot(&server, &dir.path().join("config.toml")).await;

    assert_eq!(bot.module_names(), vec!["core:commands", "core:keepnick"]);

    conn.send_raw(":alice!a@example.org PRIVMSG bot :!help")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair("alice", "Available commands: help")
    );

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!help")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair(
            "#chan",
            "Available commands: help, join, networks, part, reload, restart"
        )
    );

    conn.send_raw(":alice!a@example.org PRIVMSG bot :!help join")
        .await
        .unwrap();
    assert_eq!(reply(&mut conn).await, pair("alice", "No such command: join"));

    conn.send_raw(":admin!a@example.org PRIVMSG bot :!help !join")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair("admin", "Usage: join <channel> <network>")
    );
    assert_eq!(
        reply(&mut conn).await,
        pair("admin", "Join a channel on the given network")
    );
}

#[tokio::test]
async fn test_admin_commands() {
    let server = TestServer::bind().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (bot, mut conn) = start_bot(&server, &dir.path().join("config.toml")).await;

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!networks")
        .await
        .unwrap();
    assert_eq!(reply(&mut conn).await, pair("#chan", "My networks: test"));

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!join #new")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair("#chan", "Usage: !join <channel> <network>")
    );

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!join #new elsewhere")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair("#chan", "Unknown network: elsewhere")
    );

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!join new test")
        .await
        .unwrap();
    assert_eq!(
        reply(&mut conn).await,
        pair("#chan", "Invalid channel name: new")
    );

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!join #new test")
        .await
        .unwrap();
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#new"]);

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!part #new test see you later")
        .await
        .unwrap();
    assert_eq!(
        conn.expect("PART").await.unwrap().args,
        ["#new", "see you later"]
    );

    // Without a datadir there is nowhere to put the state file.
    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!restart")
        .await
        .unwrap();
    assert_eq!(reply(&mut conn).await, pair("#chan", "Restarting"));
    assert_eq!(
        reply(&mut conn).await,
        pair(
            "#chan",
            "Restart failed: restart is not possible without datadir"
        )
    );
    assert!(matches!(
        bot.restart().await,
        Err(BotError::RestartUnavailable)
    ));
    assert_eq!(
        bot.network("test").unwrap().state(),
        ConnectionState::Registered
    );
}

#[tokio::test]
async fn test_restart_handover_writes_state_and_can_be_undone() {
    let server = TestServer::bind().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let global = format!("{ADMINS}\ndatadir = \"{}\"", dir.path().display());
    let (bot, mut conn) = start_bot_with(&server, &dir.path().join("config.toml"), &global).await;

    let handover = bot.prepare_restart().await.unwrap();
    assert_eq!(handover.networks(), ["test"]);
    assert!(handover.path().starts_with(dir.path()));

    let state: StateFile =
        serde_json::from_slice(&std::fs::read(handover.path()).unwrap()).unwrap();
    let saved = &state.networks["test"];
    assert_eq!(saved.nick, "bot");
    assert_eq!(saved.port, server.port());

    let path = handover.path().to_owned();
    handover.cancel();
    assert!(!path.exists());

    let session = bot.network("test").unwrap();
    assert_eq!(session.state(), ConnectionState::Registered);
    conn.send_raw("PING :kept").await.unwrap();
    assert_eq!(conn.expect("PONG").await.unwrap().args, ["kept"]);
}

#[tokio::test]
async fn test_reload_picks_up_new_channels() {
    let server = TestServer::bind().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let (bot, mut conn) = start_bot(&server, &path).await;

    std::fs::write(&path, server.config_toml(ADMINS, "channels = [\"#added\"]")).unwrap();

    conn.send_raw(":admin!a@example.org PRIVMSG #chan :!reload")
        .await
        .unwrap();
    assert_eq!(conn.expect("JOIN").await.unwrap().args, ["#added"]);
    assert_eq!(reply(&mut conn).await, pair("#chan", "Reload OK"));
    assert_eq!(
        bot.config().network("test").unwrap().channels,
        vec!["#added".to_owned()]
    );

    std::fs::write(&path, "this is not toml = = =").unwrap();
    assert!(bot.reload().await.is_err());
    assert_eq!(
        bot.config().network("test").unwrap().channels,
        vec!["#added".to_owned()]
    );
}

#[tokio::test]
async fn test_shutdown_quits() {
    let server = TestServer::bind().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (bot, mut conn) = start_bot(&server, &dir.path().join("config.toml")).await;

    let stopping = {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move { bot.shutdown(Some("Shutting down")).await })
    };

    assert_eq!(conn.expect("QUIT").await.unwrap().args, ["Shutting down"]);
    assert!(conn.closed().await);
    tokio::time::timeout(common::STEP, stopping)
        .await
        .unwrap()
        .unwrap();
}
