//! Cornucopia CLI - log in to the Cornucopia API from a terminal

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use tracing::{Level, error};

#[derive(Parser)]
#[command(name = "cornucopia")]
#[command(about = "Log in to the Cornucopia API and make authenticated requests")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Directory holding the saved session and default config file
    #[arg(short = 'd', long, global = true, env = "CORNUCOPIA_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Configuration file (defaults to <state-dir>/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overriding the config file and CORNUCOPIA_API_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level.into())?;

    let state_dir = config::resolve_state_dir(cli.state_dir);
    let settings = config::load_settings(&state_dir, cli.config.as_deref(), cli.base_url)?;

    if let Err(e) = cli.command.execute(&settings).await {
        error!("Command failed: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
