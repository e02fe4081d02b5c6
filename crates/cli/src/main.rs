//! Customer churn pipeline CLI
//!
//! A command-line tool for training, publishing and scoring with the
//! churn pipeline service.

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{pipeline, predict, status};
use std::path::PathBuf;
use std::process::ExitCode;

/// Customer churn pipeline CLI
#[derive(Parser)]
#[command(name = "churnctl")]
#[command(author, version, about = "CLI for the customer churn pipeline", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CHURN_API_URL env var)
    #[arg(long, env = "CHURN_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on the raw data and stage it
    Train,

    /// Promote the staged model when it beats production
    Publish,

    /// Score customer records with the production model
    Predict {
        /// JSON file with an array of customer records
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Show service health and readiness
    Status,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Train => pipeline::train(&client, cli.format).await,
        Commands::Publish => pipeline::publish(&client, cli.format).await,
        Commands::Predict { input } => predict::predict(&client, &input, cli.format).await,
        Commands::Status => status::show_status(&client, cli.format).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
