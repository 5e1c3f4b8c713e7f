//! RBL Sourcing CLI - Operator tools for the back office.
//!
//! # Usage
//!
//! ```bash
//! # Preview the next customer identifier
//! rbl-cli next-id customer
//!
//! # List reminders that are due now, without sending anything
//! rbl-cli reminders due
//!
//! # Run one delivery pass, as the scheduler would
//! rbl-cli reminders tick
//! ```
//!
//! # Commands
//!
//! - `next-id` - Compute the next `PROD_`/`CUST_` identifier
//! - `reminders due` - Show due, upcoming and skipped reminders
//! - `reminders tick` - Deliver due reminders once

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rbl_core::SequenceKind;

mod commands;

#[derive(Parser)]
#[command(name = "rbl-cli")]
#[command(author, version, about = "RBL Sourcing back-office tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the next business identifier without reserving it
    NextId {
        /// Entity kind (`product` or `customer`)
        kind: SequenceKind,
    },
    /// Inspect or deliver reminders
    Reminders {
        #[command(subcommand)]
        action: ReminderAction,
    },
}

#[derive(Subcommand)]
enum ReminderAction {
    /// List reminders that are due now
    Due,
    /// Deliver due reminders once and record the outcome
    Tick,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbl_cli=info,rbl_admin=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::NextId { kind } => commands::ids::next_id(kind).await?,
        Commands::Reminders { action } => match action {
            ReminderAction::Due => commands::reminders::due().await?,
            ReminderAction::Tick => commands::reminders::tick().await?,
        },
    }
    Ok(())
}
