//! Insightful Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Loaded from `--config`, or the first of
//! `<config_dir>/insightful/config.toml` and `./config.toml` that exists.
//! Environment variables override file settings:
//! - `INSIGHTFUL_DATA_DIR`: Data directory
//! - `INSIGHTFUL_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `INSIGHTFUL_API_PORT`: Port to listen on (default: 4000)
//! - `INSIGHTFUL_LOG_LEVEL`: Log level (default: info)
//! - `INSIGHTFUL_LOG_FORMAT`: pretty or json
//! - `RUST_LOG`: Full filter directive, wins over the log level

use anyhow::Context;
use clap::{Parser, Subcommand};
use insightful::api::{serve, AppState};
use insightful::config::{generate_default_config, Config, LoggingConfig};
use insightful::ingest::Ingestor;
use insightful::storage::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "insightful")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local event analytics: ingest events, list and chart them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Print collection statistics and exit
    Stats,

    /// Print a default config file
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let template = generate_default_config();
        match output {
            Some(path) => std::fs::write(path, template)
                .with_context(|| format!("writing {}", path.display()))?,
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    tracing::info!("Insightful v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir);

    let engine = Arc::new(Engine::open(config.engine_config()?).await?);
    let stats = engine.stats().await;
    tracing::info!("Storage stats: {}", stats);

    match cli.command {
        Commands::Serve => {
            let ingestor = Arc::new(Ingestor::new(Arc::clone(&engine), config.validators()?));
            let server = config.server_config();
            let state = AppState::new(engine, ingestor, server.clone());
            serve(state, &server).await?;
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Config { .. } => {}
    }

    tracing::info!("Insightful stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let directive = format!("insightful={},tower_http=info", logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
