//! Wirechat — real-time direct-messaging client.
//!
//! Connects to a chat server for live messaging, presence, and typing
//! indicators, with durable history through the server's REST API.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/wirechat/config.toml`).
//!
//! ```bash
//! cargo run --bin wirechat -- --user alice --peer bob \
//!     --server-url ws://127.0.0.1:4000/ws --api-url http://127.0.0.1:4000
//! ```
//!
//! The prompt reads one line at a time: `/peer <id>` opens a
//! conversation, `/leave` closes it, `/quit` exits, and anything else is
//! sent to the active peer.

use std::io;
use std::path::Path;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use wirechat::client::{self, Command, Event};
use wirechat::config::{CliArgs, ClientConfig};
use wirechat_proto::message::UserId;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Logging goes to a file so it never interleaves with the prompt.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(user = %config.user_id, server = %config.server_url, "wirechat starting");

    let result = run(config).await;

    tracing::info!("wirechat exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure
/// all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("wirechat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main loop: one task prints events, the main task reads stdin lines.
async fn run(config: ClientConfig) -> io::Result<()> {
    let self_id = config.user_id.clone();
    let (cmd_tx, mut evt_rx) = match client::spawn_client(config).await {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let printer = tokio::spawn(async move {
        while let Some(event) = evt_rx.recv().await {
            print_event(&self_id, &event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let command = if let Some(peer) = line.strip_prefix("/peer ") {
            Command::SelectPeer(UserId::new(peer.trim()))
        } else if line == "/leave" {
            Command::ClearSelection
        } else if line == "/quit" {
            let _ = cmd_tx.send(Command::Shutdown).await;
            break;
        } else if line.starts_with('/') {
            eprintln!("unknown command: {line}");
            continue;
        } else {
            Command::SendMessage { text: line }
        };

        if cmd_tx.send(command).await.is_err() {
            eprintln!("client stopped");
            break;
        }
    }

    printer.abort();
    Ok(())
}

fn print_event(self_id: &UserId, event: &Event) {
    match event {
        Event::ConversationReplaced { peer, messages } => {
            println!("--- conversation with {peer} ({} messages) ---", messages.len());
            for message in messages {
                let marker = if message.sender == *self_id { ">" } else { "<" };
                println!(
                    "{marker} [{}] {}: {}",
                    message.created_at.format("%H:%M"),
                    message.sender,
                    message.content
                );
            }
        }
        Event::MessageAppended(message) => {
            let marker = if message.sender == *self_id { ">" } else { "<" };
            println!(
                "{marker} [{}] {}: {}",
                message.created_at.format("%H:%M"),
                message.sender,
                message.content
            );
        }
        Event::UnreadChanged { peer, count } => {
            println!("* {peer}: {count} unread");
        }
        Event::PresenceChanged(users) => {
            let names: Vec<&str> = users.iter().map(UserId::as_str).collect();
            println!("* online: {}", names.join(", "));
        }
        Event::TypingChanged { user, typing } => {
            if *typing {
                println!("* {user} is typing...");
            }
        }
        Event::Connectivity { connected } => {
            if *connected {
                println!("* connected");
            } else {
                println!("* connection lost, retrying...");
            }
        }
        Event::Error(message) => {
            eprintln!("! {message}");
        }
    }
}
