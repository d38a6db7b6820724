use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::{Config, OutputFormat};

#[derive(Parser)]
#[command(name = "qe")]
#[command(author, version, about = "Query gateway result cache tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache key of a query
    Key {
        /// Query file (JSON)
        query_file: PathBuf,
    },

    /// Replay a scenario of queries and segment changes against the cache
    Replay {
        /// Scenario file (JSON)
        scenario_file: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "qe.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if cli.json {
        config.output_format = OutputFormat::Json;
    }

    if config.output_format == OutputFormat::Table {
        print_banner();
    }

    match cli.command {
        Commands::Key { query_file } => {
            show_key(&query_file, &config)?;
        }
        Commands::Replay { scenario_file } => {
            replay(&scenario_file, &config).await?;
        }
        Commands::InitConfig { output } => {
            init_config(&output, &config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "query_cli=debug,query_core=debug,query_cache=debug,query_executor=debug"
    } else {
        "query_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        "Query Gateway Result Cache v0.1.0".bright_yellow()
    );
    println!(
        "{}",
        "Signature-validated caching for aggregation queries\n".bright_black()
    );
}
