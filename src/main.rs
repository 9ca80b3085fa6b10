//! DynamoDB Table Sync Tool
//!
//! Copies records missing from a target table out of a source table, or
//! migrates a whole table through a point-in-time export to S3.

// ddbsync/src/main.rs
mod config;
mod errors;
mod migrate;
mod operator;
mod sync;
mod table;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{AppConfig, OperationConfig, load_migrate_config_from_json, load_sync_config_from_json};
use operator::{Operator, TerminalOperator};
use std::path::PathBuf;
use std::process::ExitCode;
use sync::SyncFlags;
use sync::engine::SyncOutcome;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "ddbsync", version, about = "Sync or migrate DynamoDB tables between environments")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Copy records present in the source table but missing from the target.
    Sync {
        /// Show what would be written and exit without writing.
        #[arg(long)]
        dry_run: bool,
        /// Write without asking for confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Export the source table to S3 and import it into a new target table.
    Migrate {
        /// Start the export and import without asking for confirmation.
        #[arg(long)]
        yes: bool,
    },
}

/// Main entry point for the sync/migrate tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run_app(Cli::parse()).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ddbsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// First Ctrl-C stops between pages/groups; a second one exits immediately.
fn install_cancel_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⚠️ Cancellation requested; stopping after the current request. Press Ctrl-C again to exit now.");
            token.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });
    cancel
}

async fn run_app(cli: Cli) -> Result<()> {
    let mut app_config = AppConfig::load_from_json(&cli.config)
        .context(format!("Failed to load application configuration from {}", cli.config.display()))?;

    let operator = TerminalOperator;
    let command = match cli.command {
        Some(command) => command,
        None => prompt_choice(&operator)?,
    };
    let cancel = install_cancel_handler();

    match command {
        Command::Sync { dry_run, yes } => {
            println!("⚙️ Starting Sync Process...");
            let sync_config = load_sync_config_from_json(&app_config.raw_json_config)
                .context("Failed to load sync configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Sync(sync_config));

            let flags = SyncFlags {
                dry_run,
                assume_yes: yes,
            };
            let report = sync::run_sync_flow(&app_config, &operator, flags, cancel)
                .await
                .context("Sync process failed")?;
            tracing::debug!(final_state = ?report.final_state(), transitions = report.transitions.len(), "sync run finished");
            match sync::into_result(report)? {
                SyncOutcome::Completed { written, .. } => {
                    tracing::info!(written, "sync finished");
                }
                SyncOutcome::Declined { pending } => {
                    tracing::info!(pending, "sync finished without writing");
                }
                SyncOutcome::Failed { phase, error } => {
                    anyhow::bail!("Sync failed during {}: {}", phase, error);
                }
            }
        }
        Command::Migrate { yes } => {
            println!("🚚 Starting Migrate Process...");
            let migrate_config = load_migrate_config_from_json(&app_config.raw_json_config)
                .context("Failed to load migrate configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Migrate(migrate_config));
            migrate::run_migrate_flow(&app_config, &operator, yes, cancel)
                .await
                .context("Migrate process failed")?;
        }
    }
    Ok(())
}

/// Prompts user to select the sync or migrate operation
fn prompt_choice(operator: &dyn Operator) -> Result<Command> {
    let choice = operator.choose(
        "Select an operation:",
        &["sync", "sync (dry run)", "migrate"],
        "sync",
    )?;
    match choice.as_str() {
        "sync" => Ok(Command::Sync { dry_run: false, yes: false }),
        "sync (dry run)" => Ok(Command::Sync { dry_run: true, yes: false }),
        "migrate" => Ok(Command::Migrate { yes: false }),
        other => anyhow::bail!("Invalid operation choice: {}", other),
    }
}
