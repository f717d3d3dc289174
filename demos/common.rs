//! Command line and logging setup for the demos.

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Args
// ============================================================================

/// Demo options.
///
/// `--host <host>`, `--room <id>`, `--no-keep-alive`, `--no-wait`, `--debug`.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    pub no_keep_alive: bool,
    pub host: String,
    pub room: u64,
}

impl Args {
    /// Reads options from the process arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let flag = |name: &str| args.iter().any(|a| a == name);
        let value = |name: &str| {
            args.iter()
                .position(|a| a == name)
                .and_then(|i| args.get(i + 1))
        };

        Self {
            debug: flag("--debug"),
            no_wait: flag("--no-wait"),
            no_keep_alive: flag("--no-keep-alive"),
            host: value("--host")
                .cloned()
                .unwrap_or_else(|| "broadcastlv.chat.bilibili.com".to_string()),
            room: value("--room")
                .and_then(|room| room.parse().ok())
                .unwrap_or(21452505),
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Installs a `tracing` subscriber for the crate's own events.
pub fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("danmaku_socket={level}")))
        .with_target(false)
        .init();
}

/// Blocks until Ctrl+C, unless `--no-wait` was given.
pub async fn wait_for_exit(no_wait: bool) {
    if !no_wait {
        println!("Listening, press Ctrl+C to stop...");
        tokio::signal::ctrl_c().await.ok();
    }
}
