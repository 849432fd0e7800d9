//! Integration tests for connection loss and backoff-driven reconnection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;

use wirechat::client::{self, Command, Event};
use wirechat::config::{ClientConfig, ReconnectConfig};
use wirechat_proto::message::UserId;
use wirechat_server::hub::start_server;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config(addr: SocketAddr, user: &str, peers: &[&str]) -> ClientConfig {
    ClientConfig {
        server_url: format!("ws://{addr}/ws"),
        api_url: format!("http://{addr}"),
        user_id: UserId::new(user),
        connect_timeout: Duration::from_secs(5),
        channel_capacity: 64,
        poll_interval: Duration::from_millis(100),
        typing_window: Duration::from_millis(300),
        mark_seen_retries: 1,
        reconnect: ReconnectConfig {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
            max_attempts: None,
        },
        peers: peers.iter().map(|p| UserId::new(*p)).collect(),
    }
}

async fn wait_for<T>(
    rx: &mut mpsc::Receiver<Event>,
    mut pred: impl FnMut(&Event) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if let Some(value) = pred(&event) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_reconnects_after_server_restart() {
    let (addr, server) = start_server("127.0.0.1:0").await.expect("server start");

    let (_alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: true } => Some(()),
        _ => None,
    })
    .await;

    // Kill the server out from under the client.
    server.abort();
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: false } => Some(()),
        _ => None,
    })
    .await;

    // Bring it back on the same port; the supervisor's backoff loop
    // finds it without any action from the frontend.
    let (_addr, _server) = start_server(&addr.to_string()).await.expect("server restart");
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: true } => Some(()),
        _ => None,
    })
    .await;

    // The join announce rode the new connection, so the fresh server
    // already counts alice as online.
    wait_for(&mut alice_rx, |e| match e {
        Event::PresenceChanged(list) if list.contains(&UserId::new("alice")) => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn messaging_works_again_after_reconnect() {
    let (addr, server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");

    server.abort();
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: false } => Some(()),
        _ => None,
    })
    .await;
    let (_addr, _server) = start_server(&addr.to_string()).await.expect("server restart");
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: true } => Some(()),
        _ => None,
    })
    .await;

    // The restarted server has an empty store; a send lands in it and
    // comes back on the next reconciliation pull.
    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    alice_tx
        .send(Command::SendMessage { text: "still here".into() })
        .await
        .expect("send command");
    let messages = wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => {
            Some(messages.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(messages[0].content, "still here");
    assert!(messages[0].id.is_some());
}

#[tokio::test]
async fn bounded_attempts_give_up_with_an_error() {
    let (addr, server) = start_server("127.0.0.1:0").await.expect("server start");

    let mut config = test_config(addr, "alice", &["bob"]);
    config.reconnect.max_attempts = Some(3);
    config.connect_timeout = Duration::from_millis(500);
    let (_alice_tx, mut alice_rx) = client::spawn_client(config).await.expect("alice connect");

    // The server never comes back.
    server.abort();
    wait_for(&mut alice_rx, |e| match e {
        Event::Connectivity { connected: false } => Some(()),
        _ => None,
    })
    .await;

    let error = wait_for(&mut alice_rx, |e| match e {
        Event::Error(msg) => Some(msg.clone()),
        _ => None,
    })
    .await;
    assert!(error.contains("exhausted"));
}
