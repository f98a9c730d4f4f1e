#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use kioskwarden::cli::{Cli, Commands};
use kioskwarden::config::Config;
use kioskwarden::{status, supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    // Configuration errors are the only fatal ones: a misconfigured
    // supervisor refuses to run rather than run with undefined thresholds.
    let mut config = match &cli.workspace {
        Some(dir) => Config::load_from_dir(dir)?,
        None => Config::load_or_init()?,
    };
    config.state_file_override = cli.state_file.clone();

    match cli.command {
        Commands::Run => supervisor::run(Arc::new(config)).await,
        Commands::Status => status::run_status(&config),
        Commands::Reset => status::run_reset(&config),
    }
}
