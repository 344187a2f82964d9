mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smartsync::config::SmartSyncConfig;
use smartsync::sync::types::PushStrategy;

#[derive(Parser)]
#[command(
    name = "smartsync",
    version,
    about = "Query-triggered sync cache between a local SQLite store and a remote libSQL database, served over MCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (transport from config: stdio or http)
    Serve,
    /// Show per-table freshness and recent sync activity
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the local database and probe the remote
    Doctor,
    /// Sync tables now, regardless of freshness (all tracked tables by default)
    Sync {
        tables: Vec<String>,
    },
    /// Track a table or change its sync settings
    Track {
        table: String,
        /// Sync priority 1-5; the freshness threshold is priority x base threshold
        #[arg(long)]
        priority: Option<u8>,
        /// Enable or disable query-triggered sync
        #[arg(long)]
        auto: Option<bool>,
        /// Push strategy: last_n, changed_since, or full
        #[arg(long)]
        strategy: Option<PushStrategy>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = SmartSyncConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Status { json } => cli::status::status(&config, json)?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Sync { tables } => cli::sync::sync(&config, tables).await?,
        Command::Track {
            table,
            priority,
            auto,
            strategy,
        } => cli::track::track(&config, &table, priority, auto, strategy)?,
    }

    Ok(())
}
