//! CLI command definitions and dispatch.

pub mod jobs;
pub mod migrate;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use taskhub_core::config::AppConfig;
use taskhub_core::error::AppError;
use taskhub_database::DatabasePool;

/// TaskHub — persistent background job queue
#[derive(Debug, Parser)]
#[command(name = "taskhub", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding default.toml and per-environment overlays
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Environment overlay to load
    #[arg(short, long, env = "TASKHUB_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Job counts per state
    Status,
    /// Most recently created jobs
    List(jobs::ListArgs),
    /// Show a single job
    Show(jobs::ShowArgs),
    /// Enqueue a job
    Dispatch(jobs::DispatchArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load_from(&self.config_dir, &self.env)?;
        let db = DatabasePool::connect(&config.database).await?;

        let result = match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &db).await,
            Commands::Status => jobs::status(&db, &config).await,
            Commands::List(args) => jobs::list(args, &db, self.format).await,
            Commands::Show(args) => jobs::show(args, &db, self.format).await,
            Commands::Dispatch(args) => jobs::dispatch(args, &db).await,
        };

        db.close().await;
        result
    }
}
