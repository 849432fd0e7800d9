//! Configuration for the wirechat hub.
//!
//! The hub has a deliberately small surface: a bind address and a log
//! filter. Both can come from the CLI, the environment, or a TOML file,
//! with the usual priority (CLI, then env, then file, then defaults).

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Port the hub binds when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4000;

/// Errors that can occur when loading hub configuration.
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

    /// The configured bind address is not a valid `host:port` pair.
    #[error("invalid bind address {value:?}: {reason}")]
    InvalidBindAddr {
        /// The offending value.
        value: String,
        /// Why it failed to parse.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the hub.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileSection,
}

/// `[server]` section of the hub config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileSection {
    bind_addr: Option<String>,
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the hub server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "wirechat hub server")]
pub struct ServerCliArgs {
    /// Address to bind the hub to (`host:port`).
    #[arg(short, long, env = "WIRECHAT_BIND")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/wirechat-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "WIRECHAT_LOG")]
    pub log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved hub configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the hub binds to.
    pub bind_addr: SocketAddr,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if the resolved bind address is not a valid `host:port` pair.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. The bind address is validated here
    /// so a typo fails at startup rather than at `bind()` time with a less
    /// helpful error.
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match cli.bind.as_deref().or(file.server.bind_addr.as_deref()) {
            Some(raw) => parse_bind_addr(raw)?,
            None => defaults.bind_addr,
        };

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| file.server.log_level.clone())
            .unwrap_or(defaults.log_level);

        Ok(Self {
            bind_addr,
            log_level,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_bind_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse().map_err(|e: std::net::AddrParseError| {
        ConfigError::InvalidBindAddr {
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Load and parse a TOML config file for the hub.
///
/// An explicit `--config` path must exist; the default path may be absent.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let (path, required) = match explicit_path {
        Some(p) => (p.to_path_buf(), true),
        None => {
            let Some(config_dir) = dirs::config_dir() else {
                return Ok(ServerConfigFile::default());
            };
            (config_dir.join("wirechat-server").join("config.toml"), false)
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ServerConfigFile::default())
        }
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
