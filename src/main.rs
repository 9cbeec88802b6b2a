//! Profit Router - threshold withdrawals and periodic profit distribution
//!
//! # WARNING
//! - Transfers are irreversible once confirmed. Check destination addresses
//!   with `profit-router config` before running.
//! - The bundled collaborators are simulated; no funds move until a real
//!   custody backend is wired in.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::error;
use tracing_subscriber::EnvFilter;

// Use the library crate
use profit_router::cli::commands;
use profit_router::config::Config;

/// Profit Router - threshold withdrawals and scheduled distribution
#[derive(Parser)]
#[command(name = "profit-router")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "ROUTER_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the withdrawal monitor and distribution scheduler
    Run,

    /// Show how an amount would be distributed (nothing is sent)
    Plan {
        /// Amount in USD
        amount: Decimal,
    },

    /// Distribute an amount now
    Distribute {
        /// Amount in USD
        amount: Decimal,
    },

    /// Withdraw an amount now, outside the monitoring window
    Withdraw {
        /// Amount in USD
        amount: Decimal,
    },

    /// View withdrawal and distribution history
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("profit_router=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Plan { amount } => commands::plan(&config, amount).await,
        Commands::Distribute { amount } => commands::distribute(&config, amount).await,
        Commands::Withdraw { amount } => commands::withdraw(&config, amount).await,
        Commands::History { limit } => commands::history(&config, limit).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
