//! Kanban board server -- shared board over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 0.0.0.0:3000
//! cargo run --bin kanban-server
//!
//! # Preferred port from the environment (falls back to an ephemeral port
//! # if it is taken)
//! PORT=8080 cargo run --bin kanban-server
//!
//! # Log to a file
//! cargo run --bin kanban-server -- --log-file /tmp/kanban.log
//! ```

use std::path::Path;

use clap::Parser;
use kanban_server::chat::ChatLog;
use kanban_server::config::{ServerCliArgs, ServerConfig};
use kanban_server::hub::Hub;
use kanban_server::server;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until exit so buffered file logs are flushed.
    let _guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(host = %config.host, port = config.port, "starting kanban board server");

    let hub = Hub::new(ChatLog::with_capacity(config.chat_capacity)).spawn();

    match server::start_server_with_hub(&config.host, config.port, hub).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "board available at http://{bound_addr}");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "board server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start board server");
            std::process::exit(1);
        }
    }
}

/// Installs the tracing subscriber.
///
/// Logs go to stderr unless `file_path` is given, in which case they are
/// written through a non-blocking file appender without ANSI colors.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}
