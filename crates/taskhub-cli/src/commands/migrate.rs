//! Database migration management commands.

use clap::{Args, Subcommand};

use crate::output;
use taskhub_core::error::AppError;
use taskhub_database::DatabasePool;
use taskhub_database::migration;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Show migration status
    Status,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, db: &DatabasePool) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            migration::run_migrations(db.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Status => {
            println!("Migration status:");
            for entry in migration::migration_status(db.pool()).await? {
                let state = if entry.applied { "applied" } else { "pending" };
                println!("  {} - {} ({})", entry.version, entry.description, state);
            }
        }
    }

    Ok(())
}
