use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mietwerk_core::{PaymentId, TransactionId};
use mietwerk_match::MatchConfig;
use mietwerk_recon::Reconciler;
use mietwerk_storage::SqliteStore;

#[derive(Parser)]
#[command(name = "mietwerk", about = "Bank statement reconciliation for rental management")]
struct Cli {
    /// Database file; defaults to the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML file overriding the match scoring thresholds.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a bank statement CSV and auto-match the new transactions.
    Import {
        file: PathBuf,
        /// IBAN of the account the statement belongs to.
        #[arg(long)]
        account: String,
    },
    /// Run the auto-matcher over all unmatched transactions.
    Automatch,
    /// Show ranked match suggestions for one transaction.
    Suggest { transaction_id: i64 },
    /// Match a transaction against a payment by hand.
    Match {
        transaction_id: i64,
        payment_id: i64,
    },
    /// Undo a match and restore the payment balance.
    Unmatch { transaction_id: i64 },
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("de", "mietwerk", "Mietwerk")
        .context("no home directory available")?;
    let data_dir = project_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    Ok(data_dir.join("mietwerk.db"))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MatchConfig> {
    match path {
        None => Ok(MatchConfig::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            MatchConfig::from_toml(&text).map_err(|e| anyhow::anyhow!("{}: {e}", p.display()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let db_path = match cli.db {
        Some(p) => p,
        None => default_db_path()?,
    };
    let pool = mietwerk_storage::create_db(&db_path)
        .await
        .with_context(|| format!("opening {}", db_path.display()))?;
    let config = load_config(cli.config.as_ref())?;
    let reconciler = Reconciler::with_config(SqliteStore::new(pool), config);

    match cli.command {
        Command::Import { file, account } => {
            let csv_text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let outcome = reconciler.import_statement(&account, &csv_text).await?;
            println!(
                "imported {} transactions, auto-matched {}, skipped {}",
                outcome.imported, outcome.matched, outcome.skipped
            );
        }
        Command::Automatch => {
            let matched = reconciler.auto_match_all().await?;
            println!("auto-matched {matched} transactions");
        }
        Command::Suggest { transaction_id } => {
            let suggestions = reconciler
                .find_match_suggestions(TransactionId(transaction_id))
                .await?;
            if suggestions.is_empty() {
                println!("no candidates above the suggestion floor");
            }
            for s in suggestions {
                let mut flags = Vec::new();
                if s.is_high_confidence {
                    flags.push("high-confidence");
                }
                if s.is_recurring {
                    flags.push("recurring");
                }
                println!(
                    "payment {}  score {:5.1}  {}",
                    s.payment_id,
                    s.score,
                    flags.join(", ")
                );
            }
        }
        Command::Match {
            transaction_id,
            payment_id,
        } => {
            reconciler
                .match_transaction(TransactionId(transaction_id), PaymentId(payment_id))
                .await?;
            println!("matched transaction {transaction_id} -> payment {payment_id}");
        }
        Command::Unmatch { transaction_id } => {
            reconciler
                .unmatch_transaction(TransactionId(transaction_id))
                .await?;
            println!("unmatched transaction {transaction_id}");
        }
    }

    Ok(())
}
