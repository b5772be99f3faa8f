use anyhow::Result;
use clap::{Parser, Subcommand};

use goalforge::config::Config;
use goalforge::{api, cli};

#[derive(Parser)]
#[command(name = "goalforge")]
#[command(about = "EPL match outcome and scoreline prediction from rolling team form")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the prediction API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Download raw season result files into the combined raw table
    Fetch,
    /// Engineer rolling features from the raw table
    Preprocess,
    /// Train models on the feature table and register the run
    Train,
    /// Run the full pipeline: fetch, preprocess, train
    Pipeline,
    /// Continuously evaluate the latest run and expose gauges
    Evaluate {
        #[arg(short, long, default_value = "8002")]
        port: u16,
    },
    /// Predict a scoreline for a matchup from the command line
    Predict {
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
    },
    /// Compare the two most recent runs against the rollback threshold
    RollbackCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting GoalForge API server on port {}", port);
            api::serve(port, config).await?;
        }
        Some(Commands::Fetch) => {
            cli::fetch_data(&config).await?;
        }
        Some(Commands::Preprocess) => {
            cli::preprocess(&config)?;
        }
        Some(Commands::Train) => {
            cli::train_model(&config)?;
        }
        Some(Commands::Pipeline) => {
            cli::run_pipeline(&config).await?;
        }
        Some(Commands::Evaluate { port }) => {
            tracing::info!("Starting continuous evaluator, metrics on port {}", port);
            cli::evaluate(config, port).await?;
        }
        Some(Commands::Predict { home, away }) => {
            cli::predict_matchup(&config, &home, &away)?;
        }
        Some(Commands::RollbackCheck) => {
            cli::check_rollback(&config)?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting GoalForge API server on port 3000");
            api::serve(3000, config).await?;
        }
    }

    Ok(())
}
