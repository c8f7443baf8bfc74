//! Parcel Ledger CLI - migrations, on-demand jobs, and ledger checks.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! pl-cli migrate
//!
//! # Run one scheduler job now
//! pl-cli jobs run delivery-sweep
//!
//! # Replay a wallet's ledger against its stored balances
//! pl-cli wallet verify store 42
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `jobs run` - Run a scheduler job once
//! - `wallet verify` - Check a wallet's ledger

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use parcel_ledger_core::ledger::WalletKind;
use parcel_ledger_server::services::Job;

mod commands;

#[derive(Parser)]
#[command(name = "pl-cli")]
#[command(author, version, about = "Parcel Ledger CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run scheduler jobs
    Jobs {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Inspect wallets
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Run one pass of a job (`picking-sweep`, `delivery-sweep`,
    /// `estimate-backfill`, `payout-release`)
    Run {
        #[arg(value_parser = parse_job)]
        job: Job,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Replay a wallet's transactions and compare with its balances
    Verify {
        /// Wallet kind (`store` or `buyer`)
        #[arg(value_parser = parse_kind)]
        kind: WalletKind,

        /// Store or user id
        owner_id: i64,
    },
}

fn parse_job(raw: &str) -> Result<Job, String> {
    raw.parse().map_err(|e: parcel_ledger_server::services::UnknownJob| e.to_string())
}

fn parse_kind(raw: &str) -> Result<WalletKind, String> {
    raw.parse()
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Jobs { action } => match action {
            JobAction::Run { job } => commands::jobs::run(job).await?,
        },
        Commands::Wallet { action } => match action {
            WalletAction::Verify { kind, owner_id } => {
                commands::wallet::verify(kind, owner_id).await?;
            }
        },
    }
    Ok(())
}
