//! Configuration system for the kanban board server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban-server/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use kanban_proto::chat::DEFAULT_CHAT_CAPACITY;

/// Errors that can occur when loading server configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerSection,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    chat_capacity: Option<usize>,
    log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the board server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time collaborative kanban board server")]
pub struct ServerCliArgs {
    /// Host or IP address to listen on.
    #[arg(long, env = "KANBAN_HOST")]
    pub host: Option<String>,

    /// Preferred port; an ephemeral port is used if it is taken.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Path to config file (default: `~/.config/kanban-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of chat messages kept for new connections.
    #[arg(long)]
    pub chat_capacity: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (e.g., `0.0.0.0`).
    pub host: String,
    /// Preferred port.
    pub port: u16,
    /// Chat log capacity.
    pub chat_capacity: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file path.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            chat_capacity: DEFAULT_CHAT_CAPACITY,
            log_level: "info".to_string(),
            log_file: None,
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
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            host: cli
                .host
                .clone()
                .or_else(|| file.server.host.clone())
                .unwrap_or(defaults.host),
            port: cli.port.or(file.server.port).unwrap_or(defaults.port),
            chat_capacity: cli
                .chat_capacity
                .or(file.server.chat_capacity)
                .unwrap_or(defaults.chat_capacity),
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone().or_else(|| file.server.log_file.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse the TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("kanban-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
