//! SQLite-backed stores
//!
//! Timestamp comparisons go through `datetime()`/`date()` so rows written by
//! importers with either `YYYY-MM-DD HH:MM:SS` or ISO `T` separators compare
//! correctly against bound parameters.

use super::{EvidenceFeeds, NotificationStore, SummaryStore};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use notices_common::db::{
    DailySummary, Delivery, EmailFailure, NotificationRecord, PhoneNotice, Submission,
    SummaryTotals,
};
use notices_common::Result;
use sqlx::SqlitePool;

const RECORD_COLUMNS: &str = "id, polaris_log_id, patron_id, patron_barcode, phone, email, \
    item_barcode, notification_date, notification_type_id, delivery_option_id, \
    notification_status_id, holds_count, overdues_count, overdues_2nd_count, \
    overdues_3rd_count, cancels_count, recalls_count, bills_count, manual_bill_count, reported";

const SUMMARY_COLUMNS: &str = "summary_date, notification_type_id, delivery_option_id, \
    total_sent, total_success, total_failed, total_pending, total_holds, total_overdues, \
    total_overdues_2nd, total_overdues_3rd, total_cancels, total_recalls, total_bills, \
    unique_patrons, success_rate, failure_rate, aggregated_at";

/// Stores over a single SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn record(&self, id: i64) -> Result<Option<NotificationRecord>> {
        let sql = format!("SELECT {} FROM notification_logs WHERE id = ?", RECORD_COLUMNS);
        let record = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn records_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM notification_logs
            WHERE datetime(notification_date) >= datetime(?)
              AND datetime(notification_date) < datetime(?)
            ORDER BY notification_date ASC, id ASC
            "#,
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn records_for_patron(
        &self,
        patron_barcode: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<NotificationRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM notification_logs
            WHERE patron_barcode = ?
              AND (? IS NULL OR datetime(notification_date) >= datetime(?))
              AND (? IS NULL OR datetime(notification_date) < datetime(?))
            ORDER BY notification_date DESC, id DESC
            "#,
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(patron_barcode)
            .bind(start)
            .bind(start)
            .bind(end)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn date_bounds(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let (first, last): (Option<NaiveDate>, Option<NaiveDate>) = sqlx::query_as(
            "SELECT MIN(date(notification_date)), MAX(date(notification_date)) FROM notification_logs",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(first.zip(last))
    }
}

#[async_trait]
impl EvidenceFeeds for SqliteStore {
    async fn submissions_on(
        &self,
        patron_barcode: &str,
        submission_type: &str,
        day: NaiveDate,
    ) -> Result<Vec<Submission>> {
        let rows = sqlx::query_as::<_, Submission>(
            r#"
            SELECT id, notification_type, patron_barcode, phone_number, item_id,
                   submitted_at, source_file, delivery_type
            FROM shoutbomb_submissions
            WHERE patron_barcode = ?
              AND notification_type = ?
              AND date(submitted_at) = ?
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(patron_barcode)
        .bind(submission_type)
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn phone_notices_on(
        &self,
        patron_barcode: &str,
        day: NaiveDate,
        item_barcode: Option<&str>,
    ) -> Result<Vec<PhoneNotice>> {
        let rows = sqlx::query_as::<_, PhoneNotice>(
            r#"
            SELECT id, delivery_type, patron_barcode, first_name, last_name,
                   phone_number, item_barcode, notice_date, source_file
            FROM polaris_phone_notices
            WHERE patron_barcode = ?
              AND date(notice_date) = ?
              AND (? IS NULL OR item_barcode = ?)
            ORDER BY notice_date ASC, id ASC
            "#,
        )
        .bind(patron_barcode)
        .bind(day)
        .bind(item_barcode)
        .bind(item_barcode)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn phone_notices_between(
        &self,
        patron_barcode: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PhoneNotice>> {
        let rows = sqlx::query_as::<_, PhoneNotice>(
            r#"
            SELECT id, delivery_type, patron_barcode, first_name, last_name,
                   phone_number, item_barcode, notice_date, source_file
            FROM polaris_phone_notices
            WHERE patron_barcode = ?
              AND datetime(notice_date) >= datetime(?)
              AND datetime(notice_date) <= datetime(?)
            ORDER BY notice_date ASC, id ASC
            "#,
        )
        .bind(patron_barcode)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn deliveries_between(
        &self,
        phone_number: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, patron_barcode, phone_number, delivery_type, sent_date,
                   status, carrier, failure_reason, report_file
            FROM shoutbomb_deliveries
            WHERE phone_number = ?
              AND datetime(sent_date) >= datetime(?)
              AND datetime(sent_date) <= datetime(?)
            ORDER BY sent_date ASC, id ASC
            "#,
        )
        .bind(phone_number)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn email_failures_between(
        &self,
        recipient_email: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<EmailFailure>> {
        let rows = sqlx::query_as::<_, EmailFailure>(
            r#"
            SELECT id, recipient_email, patron_barcode, failure_reason, error_code, received_at
            FROM email_failure_reports
            WHERE lower(recipient_email) = lower(?)
              AND datetime(received_at) >= datetime(?)
              AND datetime(received_at) <= datetime(?)
            ORDER BY received_at ASC, id ASC
            "#,
        )
        .bind(recipient_email)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SummaryStore for SqliteStore {
    /// Insert or replace the row for the summary's key. An unchanged rerun
    /// leaves the stored row untouched, `aggregated_at` included.
    async fn upsert_summary(&self, summary: &DailySummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_notification_summary (
                summary_date, notification_type_id, delivery_option_id,
                total_sent, total_success, total_failed, total_pending,
                total_holds, total_overdues, total_overdues_2nd, total_overdues_3rd,
                total_cancels, total_recalls, total_bills,
                unique_patrons, success_rate, failure_rate, aggregated_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(summary_date, notification_type_id, delivery_option_id) DO UPDATE SET
                total_sent = excluded.total_sent,
                total_success = excluded.total_success,
                total_failed = excluded.total_failed,
                total_pending = excluded.total_pending,
                total_holds = excluded.total_holds,
                total_overdues = excluded.total_overdues,
                total_overdues_2nd = excluded.total_overdues_2nd,
                total_overdues_3rd = excluded.total_overdues_3rd,
                total_cancels = excluded.total_cancels,
                total_recalls = excluded.total_recalls,
                total_bills = excluded.total_bills,
                unique_patrons = excluded.unique_patrons,
                success_rate = excluded.success_rate,
                failure_rate = excluded.failure_rate,
                aggregated_at = excluded.aggregated_at,
                updated_at = CURRENT_TIMESTAMP
            WHERE total_sent != excluded.total_sent
                OR total_success != excluded.total_success
                OR total_failed != excluded.total_failed
                OR total_pending != excluded.total_pending
                OR total_holds != excluded.total_holds
                OR total_overdues != excluded.total_overdues
                OR total_overdues_2nd != excluded.total_overdues_2nd
                OR total_overdues_3rd != excluded.total_overdues_3rd
                OR total_cancels != excluded.total_cancels
                OR total_recalls != excluded.total_recalls
                OR total_bills != excluded.total_bills
                OR unique_patrons != excluded.unique_patrons
                OR success_rate != excluded.success_rate
                OR failure_rate != excluded.failure_rate
            "#,
        )
        .bind(summary.summary_date)
        .bind(summary.notification_type_id)
        .bind(summary.delivery_option_id)
        .bind(summary.total_sent)
        .bind(summary.total_success)
        .bind(summary.total_failed)
        .bind(summary.total_pending)
        .bind(summary.total_holds)
        .bind(summary.total_overdues)
        .bind(summary.total_overdues_2nd)
        .bind(summary.total_overdues_3rd)
        .bind(summary.total_cancels)
        .bind(summary.total_recalls)
        .bind(summary.total_bills)
        .bind(summary.unique_patrons)
        .bind(summary.success_rate)
        .bind(summary.failure_rate)
        .bind(summary.aggregated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn summaries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySummary>> {
        let sql = format!(
            r#"
            SELECT {} FROM daily_notification_summary
            WHERE summary_date >= ? AND summary_date <= ?
            ORDER BY summary_date ASC, notification_type_id ASC, delivery_option_id ASC
            "#,
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query_as::<_, DailySummary>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn totals_between(&self, from: NaiveDate, to: NaiveDate) -> Result<SummaryTotals> {
        let totals = sqlx::query_as::<_, SummaryTotals>(
            r#"
            SELECT
                COALESCE(SUM(total_sent), 0) AS total_sent,
                COALESCE(SUM(total_success), 0) AS total_success,
                COALESCE(SUM(total_failed), 0) AS total_failed,
                COALESCE(SUM(total_pending), 0) AS total_pending,
                COALESCE(SUM(total_holds), 0) AS total_holds,
                COALESCE(SUM(total_overdues), 0) AS total_overdues,
                COALESCE(SUM(total_bills), 0) AS total_bills
            FROM daily_notification_summary
            WHERE summary_date >= ? AND summary_date <= ?
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn delete_summaries_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_notification_summary WHERE summary_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
