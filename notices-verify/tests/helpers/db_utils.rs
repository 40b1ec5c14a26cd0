//! Database fixtures
//!
//! Every test gets its own SQLite file in a temporary directory, created with
//! the production schema. Feed rows are inserted the way the import jobs
//! would write them.

use chrono::{NaiveDate, NaiveDateTime};
use notices_common::config::EngineConfig;
use notices_common::db::{init_database, NotificationRecord};
use notices_common::time::FixedClock;
use notices_verify::{SqliteStore, VerificationEngine, VerifierRegistry};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestDb {
    // Dropping the directory deletes the database
    _temp: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SqliteStore>,
}

pub async fn create_test_db() -> TestDb {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&temp.path().join("notices.db"))
        .await
        .expect("Failed to initialize test database");
    let store = Arc::new(SqliteStore::new(pool.clone()));
    TestDb {
        _temp: temp,
        pool,
        store,
    }
}

/// A day in May 2025
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
}

/// A time of day in May 2025
pub fn at(d: u32, hour: u32, minute: u32) -> NaiveDateTime {
    day(d).and_hms_opt(hour, minute, 0).unwrap()
}

/// Engine over the test database with the clock pinned to `now`
pub fn verification_engine(db: &TestDb, now: NaiveDateTime) -> VerificationEngine {
    let config = EngineConfig::default();
    let registry = VerifierRegistry::from_config(&config).unwrap();
    VerificationEngine::new(db.store.clone(), db.store.clone(), registry, config)
        .with_clock(Arc::new(FixedClock(now)))
}

pub async fn insert_record(pool: &SqlitePool, record: &NotificationRecord) {
    sqlx::query(
        r#"
        INSERT INTO notification_logs (
            id, polaris_log_id, patron_id, patron_barcode, phone, email, item_barcode,
            notification_date, notification_type_id, delivery_option_id, notification_status_id,
            holds_count, overdues_count, overdues_2nd_count, overdues_3rd_count,
            cancels_count, recalls_count, bills_count, manual_bill_count, reported
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id)
    .bind(record.polaris_log_id)
    .bind(record.patron_id)
    .bind(&record.patron_barcode)
    .bind(&record.phone)
    .bind(&record.email)
    .bind(&record.item_barcode)
    .bind(record.notification_date)
    .bind(record.notification_type_id)
    .bind(record.delivery_option_id)
    .bind(record.notification_status_id)
    .bind(record.holds_count)
    .bind(record.overdues_count)
    .bind(record.overdues_2nd_count)
    .bind(record.overdues_3rd_count)
    .bind(record.cancels_count)
    .bind(record.recalls_count)
    .bind(record.bills_count)
    .bind(record.manual_bill_count)
    .bind(record.reported)
    .execute(pool)
    .await
    .expect("Failed to insert notification record");
}

pub async fn insert_submission(
    pool: &SqlitePool,
    barcode: &str,
    submission_type: &str,
    phone: &str,
    submitted_at: NaiveDateTime,
    source_file: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO shoutbomb_submissions
            (notification_type, patron_barcode, phone_number, submitted_at, source_file, delivery_type)
        VALUES (?, ?, ?, ?, ?, 'text')
        "#,
    )
    .bind(submission_type)
    .bind(barcode)
    .bind(phone)
    .bind(submitted_at)
    .bind(source_file)
    .execute(pool)
    .await
    .expect("Failed to insert submission");
}

pub async fn insert_phone_notice(
    pool: &SqlitePool,
    barcode: &str,
    name: Option<(&str, &str)>,
    phone: &str,
    item_barcode: Option<&str>,
    notice_date: NaiveDateTime,
) {
    sqlx::query(
        r#"
        INSERT INTO polaris_phone_notices
            (delivery_type, patron_barcode, first_name, last_name, phone_number,
             item_barcode, notice_date, source_file)
        VALUES ('TXT', ?, ?, ?, ?, ?, ?, 'PhoneNotices.csv')
        "#,
    )
    .bind(barcode)
    .bind(name.map(|(first, _)| first))
    .bind(name.map(|(_, last)| last))
    .bind(phone)
    .bind(item_barcode)
    .bind(notice_date)
    .execute(pool)
    .await
    .expect("Failed to insert phone notice");
}

pub async fn insert_delivery(
    pool: &SqlitePool,
    phone: &str,
    sent_date: NaiveDateTime,
    status: &str,
    failure_reason: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO shoutbomb_deliveries
            (phone_number, delivery_type, sent_date, status, carrier, failure_reason, report_file)
        VALUES (?, 'SMS', ?, ?, 'Verizon', ?, 'delivery_report.txt')
        "#,
    )
    .bind(phone)
    .bind(sent_date)
    .bind(status)
    .bind(failure_reason)
    .execute(pool)
    .await
    .expect("Failed to insert delivery");
}

pub async fn insert_email_failure(
    pool: &SqlitePool,
    email: &str,
    received_at: NaiveDateTime,
    failure_reason: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO email_failure_reports (recipient_email, failure_reason, error_code, received_at)
        VALUES (?, ?, '550', ?)
        "#,
    )
    .bind(email)
    .bind(failure_reason)
    .bind(received_at)
    .execute(pool)
    .await
    .expect("Failed to insert email failure");
}
