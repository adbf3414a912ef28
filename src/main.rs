use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use medassist::commands;
use medassist::config::Config;

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "MEDASSIST_LOG";

#[derive(Parser)]
#[command(name = "medassist")]
#[command(version = "0.1.0")]
#[command(about = "Ask medical questions from the terminal", long_about = None)]
struct Cli {
    /// Answer/suggestion service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Keep conversations in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the answer
    Ask { query: Vec<String> },
    /// Show suggestions for a partial question
    Suggest { query: Vec<String> },
    /// List saved conversations
    List,
    /// Delete all saved conversations
    Clear,
}

fn log_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

/// Log to a file; the terminal belongs to the chat screen.
fn init_file_logging(config: &Config, verbosity: u8) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(log_filter(verbosity))
        .init();
    Ok(())
}

fn init_stderr_logging(verbosity: u8) {
    // One-shot commands stay quiet unless asked.
    let filter = if verbosity == 0 && std::env::var(LOG_ENV).is_err() {
        EnvFilter::new("warn")
    } else {
        log_filter(verbosity)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.apply_base_url_override(cli.base_url);

    match cli.command {
        None => {
            init_file_logging(&config, cli.verbose)?;
            tracing::info!(base_url = %config.base_url, ephemeral = cli.ephemeral, "Starting medassist");

            let (engine, events) = commands::open_engine(&config, cli.ephemeral)?;
            medassist::ui::run(engine, events).await?;
        }
        Some(Commands::Ask { query }) => {
            init_stderr_logging(cli.verbose);
            commands::ask(&config, cli.ephemeral, &query.join(" ")).await?;
        }
        Some(Commands::Suggest { query }) => {
            init_stderr_logging(cli.verbose);
            commands::suggest(&config, &query.join(" ")).await?;
        }
        Some(Commands::List) => {
            init_stderr_logging(cli.verbose);
            commands::list_conversations(&config)?;
        }
        Some(Commands::Clear) => {
            init_stderr_logging(cli.verbose);
            commands::clear_conversations(&config)?;
        }
    }

    Ok(())
}
