use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `kioskwarden` - self-healing supervisor for unattended kiosk displays.
#[derive(Parser, Debug)]
#[command(name = "kioskwarden")]
#[command(version = "0.1.0")]
#[command(about = "Keeps an unattended kiosk display alive.", long_about = None)]
pub struct Cli {
    /// Workspace directory holding config.toml and state.json
    /// (default: ~/.kioskwarden)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Override the persisted state file location
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervision loop (long-lived; stop with SIGINT/SIGTERM)
    Run,

    /// Inspect the persisted supervisor snapshot
    Status,

    /// Delete the persisted state for a manual reset
    Reset,
}
