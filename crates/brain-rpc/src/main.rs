//! Brain RPC Server - JSON-RPC backend for a brain and its sequence index.
//!
//! One brain is opened at startup and shared with every request handler.

mod handlers;
mod server;

use anyhow::Result;
use brain_core::{Brain, BrainConfig, SequenceIndex};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "brain-rpc")]
#[command(about = "JSON-RPC server for a persistent n-gram brain")]
struct Args {
    /// Brain backing file
    #[arg(long, default_value = "brain.sqlite")]
    db: PathBuf,

    /// JSON file with brain settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Brain RPC Server");

    let config = match &args.config {
        Some(path) => BrainConfig::load(path)?,
        None => BrainConfig::default(),
    };
    info!(
        "Brain file: {} (chain length {})",
        args.db.display(),
        config.chain_length
    );

    let brain = Brain::open(&args.db, config)?;
    let index = SequenceIndex::for_brain(&brain);

    let addr = server::start_server(brain, index, &args.host, args.port).await?;

    // Machine-readable port line for supervising processes
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
