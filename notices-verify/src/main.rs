//! notices-verify - notice verification and daily aggregation
//!
//! Invoked by the scheduler (nightly `aggregate --yesterday`, `cleanup`) and
//! by staff troubleshooting a patron's notices. Every subcommand prints JSON
//! on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use notices_common::config::{ConfigOrigin, RootFolderInitializer, RootFolderResolver, TomlConfig};
use notices_common::db::init_database;
use notices_verify::lookups::patron_name;
use notices_verify::{
    AggregationEngine, EvidenceFeeds, NotificationStore, SqliteStore, SummaryStore,
    VerificationEngine, VerifierRegistry,
};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for notices-verify
#[derive(Parser, Debug)]
#[command(name = "notices-verify")]
#[command(about = "Verify library notice delivery and build daily summaries")]
#[command(version)]
struct Cli {
    /// Root folder holding the database
    #[arg(short, long, env = "NOTICES_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file (defaults to the platform config locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify one notification record
    Verify {
        /// Notification record id
        id: i64,
    },
    /// Verify a patron's notices, newest first
    Patron {
        barcode: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Failed notices, optionally filtered by reason
    Failures {
        #[command(flatten)]
        range: RangeArgs,
        /// Case-insensitive substring of the failure reason
        #[arg(long)]
        reason: Option<String>,
    },
    /// Failure counts grouped by reason
    FailuresByReason {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Failure counts grouped by notification type
    FailuresByType {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Notices whose evidence skips a stage
    Mismatches {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Status and mismatch counts
    Troubleshoot {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Outcome counts per delivery channel
    Channels {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Build daily summary rows
    Aggregate(AggregateArgs),
    /// Stored summary rows and their totals
    Summaries {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Delete old summary rows
    Cleanup {
        /// Days to keep (defaults to summary_retention_days)
        #[arg(long)]
        keep_days: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// First day (inclusive)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day (inclusive)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Single day
    #[arg(long, conflicts_with_all = ["from", "all", "yesterday"])]
    date: Option<NaiveDate>,
    #[arg(long, requires = "to", conflicts_with_all = ["all", "yesterday"])]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Rebuild every day that has records
    #[arg(long, conflicts_with = "yesterday")]
    all: bool,
    /// The day before today (scheduler default)
    #[arg(long)]
    yesterday: bool,
    /// Classify outcomes by full verification instead of the Polaris status
    #[arg(long)]
    verify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (toml, origin) = match &cli.config {
        Some(path) => (
            TomlConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            ConfigOrigin::File(path.clone()),
        ),
        None => TomlConfig::load_or_default(),
    };

    // Initialize tracing (stdout is reserved for JSON output)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "notices-verify {} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    origin.log();

    let root_folder = RootFolderResolver::new(cli.root_folder.clone())
        .with_toml(toml.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path(toml.database.as_deref());
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let store = Arc::new(SqliteStore::new(pool));
    let records: Arc<dyn NotificationStore> = store.clone();
    let feeds: Arc<dyn EvidenceFeeds> = store.clone();
    let summaries: Arc<dyn SummaryStore> = store;

    let config = toml.engine.clone();
    let registry = VerifierRegistry::from_config(&config).context("Invalid channel table")?;
    info!("Verifiers: {:?}", registry.names());
    let engine = Arc::new(VerificationEngine::new(
        Arc::clone(&records),
        Arc::clone(&feeds),
        registry,
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match cli.command {
        Command::Verify { id } => {
            let Some(notice) = engine.verify_by_id(id).await? else {
                bail!("Notification record {} not found", id);
            };
            let name = patron_name(&notice.record, feeds.as_ref(), config.patron_name_window()).await;
            print_json(&json!({
                "patron_name": name,
                "status_message": notice.result.status_message(),
                "record": notice.record,
                "result": notice.result,
            }))
        }
        Command::Patron { barcode, range } => {
            let notices = engine
                .verify_for_patron(&barcode, range.from, range.to, &cancel)
                .await?;
            print_json(&notices)
        }
        Command::Failures { range, reason } => {
            let failures = engine
                .failures(range.from, range.to, reason.as_deref(), &cancel)
                .await?;
            print_json(&failures)
        }
        Command::FailuresByReason { range } => {
            print_json(&engine.failures_by_reason(range.from, range.to, &cancel).await?)
        }
        Command::FailuresByType { range } => {
            print_json(&engine.failures_by_type(range.from, range.to, &cancel).await?)
        }
        Command::Mismatches { range } => {
            print_json(&engine.mismatches(range.from, range.to, &cancel).await?)
        }
        Command::Troubleshoot { range } => {
            print_json(&engine.troubleshooting_summary(range.from, range.to, &cancel).await?)
        }
        Command::Channels { range } => {
            print_json(&engine.channel_statistics(range.from, range.to, &cancel).await?)
        }
        Command::Aggregate(args) => {
            let mut aggregator = AggregationEngine::new(
                Arc::clone(&records),
                Arc::clone(&summaries),
                config.db_lock_max_wait_ms,
            );
            if args.verify {
                aggregator = aggregator.with_verification(Arc::clone(&engine));
            }

            let manifest = if let Some(date) = args.date {
                Some(aggregator.aggregate_date(date, &cancel).await?)
            } else if let (Some(from), Some(to)) = (args.from, args.to) {
                Some(aggregator.aggregate_range(from, to, &cancel).await?)
            } else if args.all {
                aggregator.aggregate_all(&cancel).await?
            } else if args.yesterday {
                Some(aggregator.aggregate_yesterday(&cancel).await?)
            } else {
                bail!("Specify one of --date, --from/--to, --all or --yesterday");
            };

            if let Some(m) = &manifest {
                if !m.errors.is_empty() {
                    warn!("{} combinations failed to aggregate", m.errors.len());
                }
            }
            print_json(&manifest)
        }
        Command::Summaries { from, to } => {
            let aggregator = AggregationEngine::new(
                Arc::clone(&records),
                Arc::clone(&summaries),
                config.db_lock_max_wait_ms,
            );
            let rows = aggregator.summaries_between(from, to).await?;
            let totals = aggregator.aggregated_totals(from, to).await?;
            print_json(&json!({ "totals": totals, "summaries": rows }))
        }
        Command::Cleanup { keep_days } => {
            let keep_days = keep_days.unwrap_or(config.summary_retention_days);
            let aggregator =
                AggregationEngine::new(records, summaries, config.db_lock_max_wait_ms);
            let removed = aggregator.cleanup_old_summaries(keep_days).await?;
            print_json(&json!({ "keep_days": keep_days, "removed": removed }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel in-flight work on Ctrl+C so scans stop issuing new reads
async fn cancel_on_signal(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, stopping after the current record");
        cancel.cancel();
    }
}
