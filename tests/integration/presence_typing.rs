//! Integration tests for the online-users roster and typing indicators.

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
    tokio::time::timeout(Duration::from_secs(5), async {
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

fn users(names: &[&str]) -> Vec<UserId> {
    names.iter().map(|n| UserId::new(*n)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_list_is_replaced_on_join_and_leave() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (_alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    wait_for(&mut alice_rx, |e| match e {
        Event::PresenceChanged(list) if *list == users(&["alice"]) => Some(()),
        _ => None,
    })
    .await;

    let (bob_tx, _bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    wait_for(&mut alice_rx, |e| match e {
        Event::PresenceChanged(list) if *list == users(&["alice", "bob"]) => Some(()),
        _ => None,
    })
    .await;

    // Bob leaves: the next broadcast no longer contains him. The list is
    // authoritative, not a diff.
    bob_tx.send(Command::Shutdown).await.expect("send command");
    wait_for(&mut alice_rx, |e| match e {
        Event::PresenceChanged(list) if *list == users(&["alice"]) => Some(()),
        _ => None,
    })
    .await;
}

/// Open the conversation with `peer` and wait until the first history
/// fetch lands. Typing indicators are scoped to the open conversation,
/// so tests asserting on them need this first.
async fn open_conversation(
    cmd_tx: &mpsc::Sender<Command>,
    rx: &mut mpsc::Receiver<Event>,
    peer: &str,
) {
    cmd_tx
        .send(Command::SelectPeer(UserId::new(peer)))
        .await
        .expect("send command");
    let wanted = UserId::new(peer);
    wait_for(rx, |e| match e {
        Event::ConversationReplaced { peer, .. } if peer == &wanted => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn typing_indicator_turns_on_then_expires() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    let (bob_tx, _bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    open_conversation(&alice_tx, &mut alice_rx, "bob").await;

    bob_tx.send(Command::Typing).await.expect("send command");

    wait_for(&mut alice_rx, |e| match e {
        Event::TypingChanged { user, typing: true } if user == &UserId::new("bob") => Some(()),
        _ => None,
    })
    .await;

    // No further notifications: the indicator clears once the window
    // elapses.
    wait_for(&mut alice_rx, |e| match e {
        Event::TypingChanged { user, typing: false } if user == &UserId::new("bob") => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn repeated_typing_extends_the_indicator_without_duplicate_events() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    let (bob_tx, _bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    open_conversation(&alice_tx, &mut alice_rx, "bob").await;

    // Bob keeps typing faster than the 300ms window expires.
    for _ in 0..4 {
        bob_tx.send(Command::Typing).await.expect("send command");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // One on-transition, then silence until the single off-transition.
    let mut transitions = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Event::TypingChanged { typing, .. } =
                alice_rx.recv().await.expect("event channel closed")
            {
                transitions.push(typing);
                if !typing {
                    break;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for typing transitions");

    assert_eq!(transitions, vec![true, false]);
}

#[tokio::test]
async fn typing_from_a_non_active_peer_is_not_surfaced() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) =
        client::spawn_client(test_config(addr, "alice", &["bob", "carol"]))
            .await
            .expect("alice connect");
    let (bob_tx, _bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    let (carol_tx, _carol_rx) = client::spawn_client(test_config(addr, "carol", &["alice"]))
        .await
        .expect("carol connect");

    // Alice is talking to bob; carol's keystrokes are not her business.
    open_conversation(&alice_tx, &mut alice_rx, "bob").await;
    carol_tx.send(Command::Typing).await.expect("send command");
    tokio::time::sleep(Duration::from_millis(200)).await;
    bob_tx.send(Command::Typing).await.expect("send command");

    let first_typing_user = wait_for(&mut alice_rx, |e| match e {
        Event::TypingChanged { user, typing: true } => Some(user.clone()),
        _ => None,
    })
    .await;
    assert_eq!(first_typing_user, UserId::new("bob"));
}

#[tokio::test]
async fn own_typing_is_not_reflected_back() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    let (bob_tx, mut bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    open_conversation(&alice_tx, &mut alice_rx, "bob").await;
    open_conversation(&bob_tx, &mut bob_rx, "alice").await;

    alice_tx.send(Command::Typing).await.expect("send command");

    // Bob sees it.
    wait_for(&mut bob_rx, |e| match e {
        Event::TypingChanged { user, typing: true } if user == &UserId::new("alice") => Some(()),
        _ => None,
    })
    .await;

    // Alice does not get her own indicator echoed back: the next typing
    // event she sees must be bob's, not hers.
    bob_tx.send(Command::Typing).await.expect("send command");
    let first_typing_user = wait_for(&mut alice_rx, |e| match e {
        Event::TypingChanged { user, typing: true } => Some(user.clone()),
        _ => None,
    })
    .await;
    assert_eq!(first_typing_user, UserId::new("bob"));
}
