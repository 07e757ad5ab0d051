//! Tether CLI
//!
//! Command-line client for realtime document backends, built on tether-core.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tether_core::{Sdk, SdkConfig, WebSocketProtocol};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether - query and watch a realtime document backend")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Backend URL (overrides config file and TETHER_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a raw API request
    Query {
        /// Controller name
        controller: String,
        /// Action name
        action: String,
        #[arg(short, long)]
        index: Option<String>,
        #[arg(short, long)]
        collection: Option<String>,
        /// Document ID
        #[arg(long)]
        id: Option<String>,
        /// Request body (JSON object)
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Search documents
    Search {
        index: String,
        collection: String,
        /// Search body (JSON object)
        #[arg(short, long)]
        body: Option<String>,
        /// Page size
        #[arg(short, long)]
        size: Option<u64>,
        /// Offset of the first hit
        #[arg(long)]
        from: Option<u64>,
        /// Scroll duration (e.g. 30s)
        #[arg(long)]
        scroll: Option<String>,
        /// Fetch every page
        #[arg(long)]
        all: bool,
    },
    /// Print notifications for a collection until interrupted
    Watch {
        index: String,
        collection: String,
        /// Subscription filters (JSON object)
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Commands that don't need a connection
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(cli.config.as_ref(), &output)
            }
            Some(ConfigCommands::Path) => commands::config::path(cli.config.as_ref(), &output),
        };
    }

    let mut config = SdkConfig::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    if let Some(url) = cli.url {
        config.url = Some(url);
    }
    let Some(url) = config.url.clone() else {
        anyhow::bail!(
            "Backend URL not configured. Set it with one of:\n  \
             tether --url ws://localhost:7512 ...\n  \
             TETHER_URL=ws://localhost:7512\n  \
             url = \"ws://localhost:7512\" in {}",
            SdkConfig::config_file_path().display()
        );
    };

    debug!("Using backend {}", url);
    let protocol = Arc::new(WebSocketProtocol::new(&url, config.websocket.clone()));
    let sdk = Sdk::new(protocol, config);
    sdk.connect()
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    info!("Connected to {}", url);

    let result = match cli.command {
        Commands::Query {
            controller,
            action,
            index,
            collection,
            id,
            body,
        } => {
            let target = commands::query::Target {
                index,
                collection,
                id,
            };
            commands::query::run(&sdk, &controller, &action, target, body.as_deref(), &output).await
        }
        Commands::Search {
            index,
            collection,
            body,
            size,
            from,
            scroll,
            all,
        } => {
            let paging = commands::search::Paging {
                size,
                from,
                scroll,
                all,
            };
            commands::search::run(&sdk, &index, &collection, body.as_deref(), paging, &output)
                .await
        }
        Commands::Watch {
            index,
            collection,
            body,
        } => commands::watch::run(&sdk, &index, &collection, body.as_deref(), &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    sdk.disconnect().await;
    debug!("Disconnected from {}", url);
    result
}

/// Log to stderr, filtered by TETHER_LOG (default: warnings)
fn init_logging() {
    let env_filter = EnvFilter::try_from_env("TETHER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("tether_core=warn,tether_cli=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
