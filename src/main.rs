// src/main.rs

use anyhow::Result;
use canister::Config;
use canister::db::Database;
use canister::repository::sync::{self, Progress};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "canister")]
#[command(author, version, about = "Ingestion pipeline for APT-style jailbreak repositories", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Canister database
    Init {
        /// Database path (overrides the configuration)
        #[arg(short, long)]
        db_path: Option<String>,
    },
    /// Run the control plane server
    Serve,
    /// Run one refresh cycle and print its progress
    Refresh,
    /// Compare two dpkg versions, printing -1, 0 or 1
    Vercmp {
        left: String,
        right: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            let config = load_config(cli.config.as_ref())?;
            let db_path = db_path
                .unwrap_or_else(|| config.storage.database.to_string_lossy().into_owned());

            info!("Initializing Canister database at: {}", db_path);
            canister::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Serve) => {
            let config = load_config(cli.config.as_ref())?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(canister::server::run_server(config))
        }
        Some(Commands::Refresh) => {
            let config = load_config(cli.config.as_ref())?;
            let db_path = config.storage.database.to_string_lossy().into_owned();
            let db = Database::open(&db_path)?;

            let print = |progress: Progress| println!("{}", progress);
            let summary = sync::refresh_with_config(&config, &db, &print)?;

            info!(
                "Refresh complete: {} succeeded, {} failed, {} cached",
                summary.successful, summary.failed, summary.cached
            );
            Ok(())
        }
        Some(Commands::Vercmp { left, right }) => {
            println!("{}", canister::version::compare_i32(&left, &right));
            Ok(())
        }
        None => {
            println!("Canister repository ingester");
            println!("Run 'canister --help' for usage information");
            Ok(())
        }
    }
}
