//! Integration tests for direct messaging against a live backend.
//!
//! Exercises the full stack: two clients connected to an in-process
//! server, live WebSocket delivery, REST persistence, unread counters,
//! the periodic reconciliation pull, and mark-seen propagation.

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

/// Drain events until `pred` returns `Some`, with a 5 second deadline.
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_echoes_locally_and_bumps_receiver_unread() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    let (_bob_tx, mut bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");

    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { peer, .. } if peer == &UserId::new("bob") => Some(()),
        _ => None,
    })
    .await;

    alice_tx
        .send(Command::SendMessage { text: "hi bob".into() })
        .await
        .expect("send command");

    // Alice sees her own message immediately (optimistic echo).
    let echoed = wait_for(&mut alice_rx, |e| match e {
        Event::MessageAppended(m) => Some(m.clone()),
        _ => None,
    })
    .await;
    assert_eq!(echoed.sender, UserId::new("alice"));
    assert_eq!(echoed.content, "hi bob");
    assert!(echoed.id.is_none());

    // Bob has no conversation open, so the live push lands as unread.
    let (peer, count) = wait_for(&mut bob_rx, |e| match e {
        Event::UnreadChanged { peer, count } => Some((peer.clone(), *count)),
        _ => None,
    })
    .await;
    assert_eq!(peer, UserId::new("alice"));
    assert_eq!(count, 1);
}

#[tokio::test]
async fn reconciliation_keeps_exactly_one_copy_of_each_message() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");

    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    alice_tx
        .send(Command::SendMessage { text: "only once".into() })
        .await
        .expect("send command");

    // Wait for a pull that contains the persisted copy.
    let messages = wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => {
            Some(messages.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].id.is_some(), "pull returns the persisted copy");
    assert_eq!(messages[0].content, "only once");

    // Later pulls must not grow the list: the replace swallows the
    // optimistic echo instead of stacking duplicates next to it.
    for _ in 0..3 {
        let messages = wait_for(&mut alice_rx, |e| match e {
            Event::ConversationReplaced { messages, .. } => Some(messages.clone()),
            _ => None,
        })
        .await;
        assert_eq!(messages.len(), 1);
    }
}

#[tokio::test]
async fn message_sent_while_peer_offline_arrives_via_history() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    // Bob is not connected; the live push goes nowhere, but the REST
    // persist still lands.
    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    alice_tx
        .send(Command::SendMessage { text: "you there?".into() })
        .await
        .expect("send command");
    wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => Some(()),
        _ => None,
    })
    .await;

    // Bob connects later and opens the conversation: the message is in
    // the fetched history.
    let (bob_tx, mut bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");
    bob_tx
        .send(Command::SelectPeer(UserId::new("alice")))
        .await
        .expect("send command");
    let messages = wait_for(&mut bob_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => {
            Some(messages.clone())
        }
        _ => None,
    })
    .await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "you there?");
}

#[tokio::test]
async fn viewing_a_conversation_marks_messages_seen_for_the_sender() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");
    let (bob_tx, mut bob_rx) = client::spawn_client(test_config(addr, "bob", &["alice"]))
        .await
        .expect("bob connect");

    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    alice_tx
        .send(Command::SendMessage { text: "read me".into() })
        .await
        .expect("send command");

    // Until bob looks, alice's pulls show the message unseen.
    let messages = wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => {
            Some(messages.clone())
        }
        _ => None,
    })
    .await;
    assert!(!messages[0].seen);

    // Bob opens the conversation, which marks the message seen. The list
    // he is handed already reflects the flip, not the pre-flip fetch.
    bob_tx
        .send(Command::SelectPeer(UserId::new("alice")))
        .await
        .expect("send command");
    let bob_view = wait_for(&mut bob_rx, |e| match e {
        Event::ConversationReplaced { messages, .. } if !messages.is_empty() => {
            Some(messages.clone())
        }
        _ => None,
    })
    .await;
    assert!(bob_view[0].seen);

    // A later pull on alice's side reflects it.
    wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { messages, .. }
            if messages.first().is_some_and(|m| m.seen) =>
        {
            Some(())
        }
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn selecting_an_unknown_peer_is_reported_not_fatal() {
    let (addr, _server) = start_server("127.0.0.1:0").await.expect("server start");

    let (alice_tx, mut alice_rx) = client::spawn_client(test_config(addr, "alice", &["bob"]))
        .await
        .expect("alice connect");

    alice_tx
        .send(Command::SelectPeer(UserId::new("mallory")))
        .await
        .expect("send command");
    let error = wait_for(&mut alice_rx, |e| match e {
        Event::Error(msg) => Some(msg.clone()),
        _ => None,
    })
    .await;
    assert!(error.contains("unknown peer"));

    // The client is still usable afterwards.
    alice_tx
        .send(Command::SelectPeer(UserId::new("bob")))
        .await
        .expect("send command");
    wait_for(&mut alice_rx, |e| match e {
        Event::ConversationReplaced { peer, .. } if peer == &UserId::new("bob") => Some(()),
        _ => None,
    })
    .await;
}
