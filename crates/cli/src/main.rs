//! Medicine Quality Monitor CLI
//!
//! A command-line tool for training the quality and anomaly models,
//! scoring conditions and running product analyses against a local
//! model directory.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{analyze, detect, predict, train, Context};
use inference_lib::ProductStatus;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Medicine Quality Monitor CLI
#[derive(Parser)]
#[command(name = "qm")]
#[command(author, version, about = "CLI for the Medicine Quality Monitor", long_about = None)]
pub struct Cli {
    /// Model artifact directory (can also be set via QM_MODEL_DIR env var)
    #[arg(long, env = "QM_MODEL_DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and persist the quality model, and optionally the anomaly model
    Train {
        /// JSON array of historical quality records
        #[arg(long)]
        records: PathBuf,

        /// JSON array of sensor readings for the anomaly model
        #[arg(long)]
        readings: Option<PathBuf>,
    },

    /// Predict quality score and status for one sample
    Predict {
        #[command(flatten)]
        conditions: ConditionArgs,

        /// Days since manufacturing
        #[arg(long, default_value_t = 0.0)]
        days_elapsed: f64,
    },

    /// Project quality over the coming days
    Timeline {
        #[command(flatten)]
        conditions: ConditionArgs,

        /// Horizon in days (points every 5 days)
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Score one sensor reading with the anomaly model
    Detect {
        #[command(flatten)]
        reading: ReadingArgs,
    },

    /// Evaluate threshold alerts for one sensor reading
    Alerts {
        #[command(flatten)]
        reading: ReadingArgs,

        /// Current product status ("Safe & Verified", "Warning", "Alert")
        #[arg(long, default_value = "Safe & Verified")]
        status: ProductStatus,
    },

    /// Run a smart analysis for a product from a data snapshot
    Analyze {
        /// JSON snapshot with products, readings and quality records
        #[arg(long)]
        data: PathBuf,

        /// Product to analyze
        #[arg(long)]
        product_id: i64,
    },

    /// Show model status
    Status,
}

/// Storage and lab conditions shared by `predict` and `timeline`
#[derive(Args)]
pub struct ConditionArgs {
    /// Storage temperature in °C
    #[arg(long)]
    pub temperature: f64,

    /// Storage relative humidity in %
    #[arg(long)]
    pub humidity: f64,

    #[arg(long, default_value_t = 7.0)]
    pub ph: f64,

    /// Moisture content in %
    #[arg(long, default_value_t = 5.0)]
    pub moisture: f64,

    /// Impurity percentage
    #[arg(long, default_value_t = 0.5)]
    pub impurity: f64,

    /// Active ingredient concentration in %
    #[arg(long, default_value_t = 95.0)]
    pub active_ingredient: f64,
}

#[derive(Args)]
pub struct ReadingArgs {
    /// Temperature in °C
    #[arg(long)]
    pub temperature: f64,

    /// Relative humidity in %
    #[arg(long)]
    pub humidity: f64,

    #[arg(long)]
    pub light_exposure: Option<f64>,

    #[arg(long)]
    pub vibration: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }

    let settings = config::Config::load()?;
    let ctx = Context::new(
        settings.resolve_model_dir(cli.model_dir),
        cli.format.unwrap_or_else(|| settings.resolve_format()),
    );

    match cli.command {
        Commands::Train { records, readings } => {
            train::train(&ctx, &records, readings.as_deref())?;
        }
        Commands::Predict {
            conditions,
            days_elapsed,
        } => {
            predict::predict(&ctx, &conditions, days_elapsed)?;
        }
        Commands::Timeline { conditions, days } => {
            predict::timeline(&ctx, &conditions, days)?;
        }
        Commands::Detect { reading } => {
            detect::detect(&ctx, &reading)?;
        }
        Commands::Alerts { reading, status } => {
            detect::alerts(&ctx, &reading, status)?;
        }
        Commands::Analyze { data, product_id } => {
            analyze::analyze(&ctx, &data, product_id)?;
        }
        Commands::Status => {
            analyze::status(&ctx)?;
        }
    }

    Ok(())
}
