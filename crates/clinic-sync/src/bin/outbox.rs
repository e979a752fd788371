//! # Outbox Tool
//!
//! Inspects and replays the local payment outbox.
//!
//! ## Usage
//! ```bash
//! # Unreplayed records with their replay state
//! outbox list
//!
//! # Every record ever queued, replayed or not
//! outbox list --all
//!
//! # One replay pass against the configured backend
//! CLINIC_BACKEND_URL=https://api.clinic.example/api outbox replay
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use clinic_db::{Database, DbConfig, PendingPayment};
use clinic_sync::{init_tracing, HttpBackend, LedgerConfig, OutboxReplayer};

#[derive(Debug, Parser)]
#[command(name = "outbox", about = "Inspect and replay the local payment outbox")]
struct Cli {
    /// Config file (defaults to the platform config dir).
    #[arg(long, short, env = "CLINIC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print queued payments.
    List {
        /// Include records the backend already confirmed.
        #[arg(long)]
        all: bool,
    },
    /// Run one replay pass.
    Replay,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let config = LedgerConfig::load(cli.config)?;
    let db = Database::new(DbConfig::new(config.database_path())).await?;

    match cli.command {
        Command::List { all } => {
            let entries = if all {
                db.outbox().list_pending().await?
            } else {
                db.outbox().list_unreplayed().await?
            };
            print_entries(&entries, config.outbox.max_attempts);
        }
        Command::Replay => {
            if !config.outbox.replay_enabled {
                warn!("Replay is disabled in config, running a single pass anyway");
            }
            let backend = Arc::new(HttpBackend::new(&config.backend)?);
            let (replayer, _handle) = OutboxReplayer::new(db.clone(), backend, config.outbox.clone());

            let summary = replayer.run_once().await?;
            info!(?summary, "Replay finished");
            println!(
                "attempted {}, replayed {}, failed {}, skipped {}",
                summary.attempted, summary.replayed, summary.failed, summary.skipped
            );
        }
    }

    db.close().await;
    Ok(())
}

fn print_entries(entries: &[PendingPayment], max_attempts: u32) {
    if entries.is_empty() {
        println!("outbox is empty");
        return;
    }

    println!(
        "{:>5}  {:<36}  {:<28}  {:>12}  {:<13}  {:>8}  {}",
        "SEQ", "RECORD", "TARGET", "AMOUNT", "METHOD", "ATTEMPTS", "STATE"
    );

    for entry in entries {
        let state = if entry.replay.is_replayed() {
            "replayed"
        } else if entry.replay.attempts >= i64::from(max_attempts) {
            "exhausted"
        } else {
            "pending"
        };

        println!(
            "{:>5}  {:<36}  {:<28}  {:>12}  {:<13}  {:>8}  {}",
            entry.seq,
            entry.record.id,
            entry.record.target.to_string(),
            entry.record.amount.to_string(),
            entry.record.method.as_str(),
            entry.replay.attempts,
            state
        );

        if let Some(err) = &entry.replay.last_error {
            println!("       last error: {err}");
        }
    }
}
