//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date. Every
//! statement is `IF NOT EXISTS`, so running it against an existing database is
//! a no-op.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when the schema changes
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets report readers run while an aggregation run writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 250")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_notification_logs_table(pool).await?;
    create_submissions_table(pool).await?;
    create_phone_notices_table(pool).await?;
    create_deliveries_table(pool).await?;
    create_email_failure_reports_table(pool).await?;
    create_daily_summary_table(pool).await?;
    record_schema_version(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    match version {
        Some(v) if v == CURRENT_SCHEMA_VERSION => {}
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            warn!(
                "Database schema version ({}) is newer than code version ({})",
                v, CURRENT_SCHEMA_VERSION
            );
        }
        _ => {
            sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
                .bind(CURRENT_SCHEMA_VERSION)
                .execute(pool)
                .await?;
            info!("Database schema at v{}", CURRENT_SCHEMA_VERSION);
        }
    }

    Ok(())
}

async fn create_notification_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            polaris_log_id INTEGER UNIQUE,
            patron_id INTEGER,
            patron_barcode TEXT,
            phone TEXT,
            email TEXT,
            item_barcode TEXT,
            notification_date TIMESTAMP NOT NULL,
            notification_type_id INTEGER NOT NULL,
            delivery_option_id INTEGER NOT NULL,
            notification_status_id INTEGER NOT NULL DEFAULT 0,
            holds_count INTEGER NOT NULL DEFAULT 0,
            overdues_count INTEGER NOT NULL DEFAULT 0,
            overdues_2nd_count INTEGER NOT NULL DEFAULT 0,
            overdues_3rd_count INTEGER NOT NULL DEFAULT 0,
            cancels_count INTEGER NOT NULL DEFAULT 0,
            recalls_count INTEGER NOT NULL DEFAULT 0,
            bills_count INTEGER NOT NULL DEFAULT 0,
            manual_bill_count INTEGER NOT NULL DEFAULT 0,
            reported INTEGER NOT NULL DEFAULT 0,
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_nl_date ON notification_logs(notification_date)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_nl_barcode_date ON notification_logs(patron_barcode, notification_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shoutbomb_submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            notification_type TEXT NOT NULL,
            patron_barcode TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            item_id TEXT,
            submitted_at TIMESTAMP NOT NULL,
            source_file TEXT NOT NULL,
            delivery_type TEXT,
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sub_barcode_date ON shoutbomb_submissions(patron_barcode, submitted_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_phone_notices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS polaris_phone_notices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            delivery_type TEXT NOT NULL,
            patron_barcode TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT,
            phone_number TEXT NOT NULL,
            item_barcode TEXT,
            notice_date TIMESTAMP NOT NULL,
            source_file TEXT,
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ppn_barcode_date ON polaris_phone_notices(patron_barcode, notice_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_deliveries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shoutbomb_deliveries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patron_barcode TEXT,
            phone_number TEXT NOT NULL,
            delivery_type TEXT NOT NULL,
            sent_date TIMESTAMP NOT NULL,
            status TEXT NOT NULL DEFAULT 'Pending',
            carrier TEXT,
            failure_reason TEXT,
            report_file TEXT,
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sd_phone_date ON shoutbomb_deliveries(phone_number, sent_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_email_failure_reports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_failure_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_email TEXT NOT NULL,
            patron_barcode TEXT,
            failure_reason TEXT,
            error_code TEXT,
            received_at TIMESTAMP NOT NULL,
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_efr_email_date ON email_failure_reports(recipient_email, received_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_daily_summary_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_notification_summary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            summary_date DATE NOT NULL,
            notification_type_id INTEGER NOT NULL,
            delivery_option_id INTEGER NOT NULL,
            total_sent INTEGER NOT NULL DEFAULT 0,
            total_success INTEGER NOT NULL DEFAULT 0,
            total_failed INTEGER NOT NULL DEFAULT 0,
            total_pending INTEGER NOT NULL DEFAULT 0,
            total_holds INTEGER NOT NULL DEFAULT 0,
            total_overdues INTEGER NOT NULL DEFAULT 0,
            total_overdues_2nd INTEGER NOT NULL DEFAULT 0,
            total_overdues_3rd INTEGER NOT NULL DEFAULT 0,
            total_cancels INTEGER NOT NULL DEFAULT 0,
            total_recalls INTEGER NOT NULL DEFAULT 0,
            total_bills INTEGER NOT NULL DEFAULT 0,
            unique_patrons INTEGER NOT NULL DEFAULT 0,
            success_rate REAL NOT NULL DEFAULT 0,
            failure_rate REAL NOT NULL DEFAULT 0,
            aggregated_at TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(summary_date, notification_type_id, delivery_option_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
