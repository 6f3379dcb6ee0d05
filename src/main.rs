mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod queue;
mod services;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "betforge")]
#[command(about = "AI-assisted football betting analysis with EV filtering and daily reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server, the analysis worker and the periodic sweep
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize the database
    InitDb,
    /// Import fixtures from a JSON array file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Queue unanalyzed fixtures and run the analysis worker until done
    Sweep {
        /// Only fixtures kicking off within the upcoming window
        #[arg(short, long)]
        upcoming: bool,
        /// Day to sweep (YYYY-MM-DD), today by default
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Analyze a single fixture now and print the result
    Analyze {
        #[arg(short, long)]
        id: i64,
    },
    /// Compose the daily report and send it to Telegram
    Report {
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Print the report instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Ask the AI for the day's accumulator suggestions
    Multiples {
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Export a day's graded fixtures as CSV
    Export {
        #[arg(short, long)]
        date: NaiveDate,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(config.api_port);
            tracing::info!("Starting BetForge API server on port {}", port);
            api::serve(config, port).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        Some(Commands::Import { file }) => {
            cli::import_fixtures(&config, &file).await?;
        }
        Some(Commands::Sweep { upcoming, date }) => {
            cli::sweep(&config, date, upcoming).await?;
        }
        Some(Commands::Analyze { id }) => {
            cli::analyze(&config, id).await?;
        }
        Some(Commands::Report { date, dry_run }) => {
            cli::report(&config, date, dry_run).await?;
        }
        Some(Commands::Multiples { date }) => {
            cli::multiples(&config, date).await?;
        }
        Some(Commands::Export { date, out }) => {
            cli::export(&config, date, &out).await?;
        }
        None => {
            let port = config.api_port;
            tracing::info!("Starting BetForge API server on port {}", port);
            api::serve(config, port).await?;
        }
    }

    Ok(())
}
