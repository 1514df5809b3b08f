//! CLI entry point for the kinship relationship sync engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use kinship_core::config::load_config;
use kinship_sync::{FsStore, JsonRecordCodec, RecordCodec, SyncCoordinator, SyncResult};

#[derive(Parser)]
#[command(name = "kinship")]
#[command(about = "Keep contact relationships consistent across a notes vault")]
struct Cli {
    /// Vault root directory.
    #[arg(short, long, default_value = ".")]
    vault: PathBuf,

    /// Config file prefix (default: kinship).
    #[arg(short, long, default_value = "kinship")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the graph and rewrite every contact document from it.
    Resync,

    /// Report relationships missing their reciprocal.
    Check {
        /// Add the missing reciprocals and rewrite affected documents.
        #[arg(long)]
        repair: bool,
    },

    /// Create or update contacts from a JSON record file.
    Import {
        file: PathBuf,
    },

    /// Print every contact as a JSON record.
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    tracing::info!(vault = %cli.vault.display(), folder = %config.contacts_folder, "Opening vault");

    let store = Arc::new(FsStore::new(&cli.vault));
    let coordinator = Arc::new(SyncCoordinator::new(store, config));

    match cli.command {
        Command::Resync => {
            let result = coordinator.resync_all().await;
            report(&result)?;
        }
        Command::Check { repair } => {
            let init = coordinator.init().await;
            if !init.success {
                report(&init)?;
            }
            let missing = coordinator.check_consistency();
            println!("{}", serde_json::to_string_pretty(&missing)?);
            if repair && !missing.is_empty() {
                let result = coordinator.repair().await;
                report(&result)?;
            }
        }
        Command::Import { file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let records = JsonRecordCodec::default().parse(&text)?;
            tracing::info!(file = %file.display(), records = records.len(), "Importing records");

            report(&coordinator.init().await)?;
            let mut total = SyncResult::new();
            for record in records {
                total.merge(coordinator.apply_record(record).await);
            }
            report(&total)?;
        }
        Command::Export => {
            report(&coordinator.init().await)?;
            let records = coordinator.export_records().await?;
            println!("{}", JsonRecordCodec::pretty().serialize(&records)?);
        }
    }

    Ok(())
}

fn report(result: &SyncResult) -> anyhow::Result<()> {
    if !result.documents_updated.is_empty() || !result.errors.is_empty() {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    if !result.success {
        anyhow::bail!("sync finished with {} error(s)", result.errors.len());
    }
    Ok(())
}
