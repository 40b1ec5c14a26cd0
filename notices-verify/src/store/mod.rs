//! Store interfaces
//!
//! The engines never query a database directly. They read through these
//! traits so that tests (and alternative backends) can supply their own rows
//! or inject read failures. `SqliteStore` implements all three.
//!
//! Every feed query returns rows ordered by timestamp ascending, then row id,
//! so the first element is always the earliest match.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use notices_common::db::{
    DailySummary, Delivery, EmailFailure, NotificationRecord, PhoneNotice, Submission,
    SummaryTotals,
};
use notices_common::Result;

/// Feed name: submission files sent to the phone provider
pub const FEED_SUBMISSIONS: &str = "shoutbomb_submissions";
/// Feed name: Polaris phone-notice export
pub const FEED_PHONE_NOTICES: &str = "polaris_phone_notices";
/// Feed name: provider delivery reports
pub const FEED_DELIVERIES: &str = "shoutbomb_deliveries";
/// Feed name: email bounce reports
pub const FEED_EMAIL_FAILURES: &str = "email_failure_reports";
/// Feed name: the canonical notification log
pub const FEED_NOTIFICATION_LOGS: &str = "notification_logs";

/// Canonical notification log
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn record(&self, id: i64) -> Result<Option<NotificationRecord>>;

    /// Records with `start <= notification_date < end`, oldest first
    async fn records_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>>;

    /// A patron's records, newest first; bounds are `[start, end)` when given
    async fn records_for_patron(
        &self,
        patron_barcode: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<NotificationRecord>>;

    /// Earliest and latest notification dates, `None` when the log is empty
    async fn date_bounds(&self) -> Result<Option<(NaiveDate, NaiveDate)>>;
}

/// Read-only evidence feeds
#[async_trait]
pub trait EvidenceFeeds: Send + Sync {
    /// Submissions of one type for a patron on a calendar day
    async fn submissions_on(
        &self,
        patron_barcode: &str,
        submission_type: &str,
        day: NaiveDate,
    ) -> Result<Vec<Submission>>;

    /// Phone notices for a patron on a calendar day, narrowed by item when given
    async fn phone_notices_on(
        &self,
        patron_barcode: &str,
        day: NaiveDate,
        item_barcode: Option<&str>,
    ) -> Result<Vec<PhoneNotice>>;

    /// Phone notices for a patron with `start <= notice_date <= end`
    async fn phone_notices_between(
        &self,
        patron_barcode: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PhoneNotice>>;

    /// Delivery reports for a phone number with `start <= sent_date <= end`
    async fn deliveries_between(
        &self,
        phone_number: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Delivery>>;

    /// Bounces for an address with `start <= received_at <= end`
    async fn email_failures_between(
        &self,
        recipient_email: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<EmailFailure>>;
}

/// Daily rollup table
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert or replace the row for the summary's key
    async fn upsert_summary(&self, summary: &DailySummary) -> Result<()>;

    /// Rows with `from <= summary_date <= to`, ordered by date, type, channel
    async fn summaries_between(&self, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<DailySummary>>;

    /// Column sums for `from <= summary_date <= to`
    async fn totals_between(&self, from: NaiveDate, to: NaiveDate) -> Result<SummaryTotals>;

    /// Delete rows dated before `cutoff`; returns the number removed
    async fn delete_summaries_before(&self, cutoff: NaiveDate) -> Result<u64>;
}
