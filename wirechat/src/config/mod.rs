//! Configuration system for the Wirechat client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/wirechat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use wirechat_proto::message::UserId;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A URL field did not parse or had the wrong scheme.
    #[error("invalid {field} \"{value}\": {reason}")]
    InvalidUrl {
        /// Which config field was bad.
        field: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required field was not supplied anywhere in the layers.
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    sync: SyncFileConfig,
    reconnect: ReconnectFileConfig,
    roster: RosterFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    server_url: Option<String>,
    api_url: Option<String>,
    user_id: Option<String>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    poll_interval_ms: Option<u64>,
    typing_window_ms: Option<u64>,
    mark_seen_retries: Option<u32>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    max_attempts: Option<u32>,
}

/// `[roster]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RosterFileConfig {
    peers: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Reconnection policy for the WebSocket link.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_backoff: Duration,
    /// Ceiling the doubling backoff is clamped to.
    pub max_backoff: Duration,
    /// Attempts before giving up (`None` = retry forever).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// WebSocket URL of the chat server (`ws://` or `wss://`).
    pub server_url: String,
    /// Base URL of the REST message API (`http://` or `https://`).
    pub api_url: String,
    /// Identity to join the server as.
    pub user_id: UserId,
    /// Timeout for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,

    // -- Sync --
    /// Interval between full history re-fetches for the open conversation.
    pub poll_interval: Duration,
    /// How long a typing indicator stays on past the last notification.
    pub typing_window: Duration,
    /// Retries for a failed mark-seen call.
    pub mark_seen_retries: u32,

    // -- Reconnect --
    /// WebSocket reconnection policy.
    pub reconnect: ReconnectConfig,

    // -- Roster --
    /// Peers selectable as conversation partners.
    pub peers: Vec<UserId>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:4000/ws".to_string(),
            api_url: "http://localhost:4000".to_string(),
            user_id: UserId::new(""),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            poll_interval: Duration::from_millis(2000),
            typing_window: Duration::from_millis(2000),
            mark_seen_retries: 1,
            reconnect: ReconnectConfig::default(),
            peers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/wirechat/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// if a URL is malformed or has the wrong scheme, or if no user id was
    /// supplied anywhere.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let user_id = cli
            .user_id
            .clone()
            .or_else(|| file.network.user_id.clone())
            .ok_or(ConfigError::Missing("user id (--user or [network].user_id)"))?;

        let mut peers: Vec<UserId> = if cli.peers.is_empty() {
            file.roster
                .peers
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(UserId::new)
                .collect()
        } else {
            cli.peers.iter().map(UserId::new).collect()
        };
        peers.retain(|p| p.as_str() != user_id);

        Ok(Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.network.server_url.clone())
                .unwrap_or(defaults.server_url),
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.network.api_url.clone())
                .unwrap_or(defaults.api_url),
            user_id: UserId::new(user_id),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .network
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            poll_interval: file
                .sync
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            typing_window: file
                .sync
                .typing_window_ms
                .map_or(defaults.typing_window, Duration::from_millis),
            mark_seen_retries: file
                .sync
                .mark_seen_retries
                .unwrap_or(defaults.mark_seen_retries),
            reconnect: ReconnectConfig {
                initial_backoff: file
                    .reconnect
                    .initial_backoff_ms
                    .map_or(defaults.reconnect.initial_backoff, Duration::from_millis),
                max_backoff: file
                    .reconnect
                    .max_backoff_ms
                    .map_or(defaults.reconnect.max_backoff, Duration::from_millis),
                max_attempts: file.reconnect.max_attempts.or(defaults.reconnect.max_attempts),
            },
            peers,
        })
    }

    /// Check URL schemes with the `url` crate.
    fn validate(&self) -> Result<(), ConfigError> {
        check_url(&self.server_url, "server_url", &["ws", "wss"])?;
        check_url(&self.api_url, "api_url", &["http", "https"])?;
        Ok(())
    }
}

fn check_url(value: &str, field: &'static str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("scheme must be one of {schemes:?}"),
        });
    }
    Ok(())
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time direct-messaging client")]
pub struct CliArgs {
    /// WebSocket URL of the chat server.
    #[arg(long, env = "WIRECHAT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Base URL of the REST message API.
    #[arg(long, env = "WIRECHAT_API_URL")]
    pub api_url: Option<String>,

    /// Identity to join as.
    #[arg(short, long = "user", env = "WIRECHAT_USER")]
    pub user_id: Option<String>,

    /// Peers to chat with (repeatable).
    #[arg(short, long = "peer")]
    pub peers: Vec<String>,

    /// Path to config file (default: `~/.config/wirechat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "WIRECHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/wirechat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("wirechat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
