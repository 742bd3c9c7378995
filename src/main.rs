//! Drupalgate CLI Entry Point
//!
//! Resolves the connection profile from the Drupal settings file, builds the
//! gateway, and serves MCP over stdio. A profile that cannot be parsed is
//! fatal: every tool action depends on it, so the process refuses to start.
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use drupalgate::gateway::DatabaseGateway;
use drupalgate::mcp::{self, ServerContext};
use drupalgate::settings;

/// Drupalgate - Read-only MCP gateway for Drupal databases
#[derive(Parser)]
#[command(name = "drupalgate")]
#[command(about = "Read-only MCP gateway for Drupal databases")]
#[command(version)]
struct Cli {
    /// Path to the Drupal settings.php file
    #[arg(long, env = "DRUPAL_SETTINGS_FILE")]
    settings_file: PathBuf,

    /// Database target key within $databases (replica is always 'default')
    #[arg(long, default_value = "default")]
    target: String,

    /// Override the parsed database host
    #[arg(long)]
    db_host: Option<String>,

    /// Override the parsed database port
    #[arg(long)]
    db_port: Option<u16>,

    /// Per-call database timeout in milliseconds (0 disables)
    #[arg(long, default_value_t = 30_000)]
    query_timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    // Logs on stderr; stdout belongs to the JSON-RPC stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut profile = match settings::load_profile(&cli.settings_file, &cli.target) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(
                settings_file = %cli.settings_file.display(),
                "failed to resolve connection profile: {e}"
            );
            eprintln!("drupalgate: {e}");
            std::process::exit(1);
        }
    };

    if let Some(host) = cli.db_host {
        profile.host = host;
    }
    if let Some(port) = cli.db_port {
        profile.port = port;
    }

    tracing::info!(
        driver = %profile.driver,
        host = %profile.host,
        port = profile.port,
        database = %profile.database,
        "connection profile resolved"
    );

    let timeout = match cli.query_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    let ctx = ServerContext {
        gateway: Arc::new(DatabaseGateway::new(profile)),
        timeout,
    };

    tracing::info!("drupalgate MCP server ready on stdio");
    if let Err(e) = mcp::serve(ctx).await {
        tracing::error!("server terminated: {e}");
        std::process::exit(1);
    }
}
