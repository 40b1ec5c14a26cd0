//! Daily aggregation
//!
//! Rolls notification records into one `DailySummary` row per
//! (date, notification type, delivery option). Rows are replaced wholesale by
//! a single upsert, so re-running a day with unchanged inputs reproduces the
//! same rows. Combinations are independent: a failed write is recorded in the
//! manifest and the run moves on.

use crate::engine::{check_range, VerificationEngine};
use crate::error::{VerifyError, VerifyResult};
use crate::result::OverallStatus;
use crate::store::{NotificationStore, SummaryStore};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use notices_common::db::{DailySummary, NotificationRecord, SummaryTotals};
use notices_common::retry::retry_on_lock;
use notices_common::time::{day_span, days_between, round2, Clock, SystemClock};
use notices_common::{Error, Outcome};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Something that went wrong for one date or one combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationIssue {
    pub date: NaiveDate,
    /// Absent when the whole date could not be read
    pub notification_type_id: Option<i64>,
    pub delivery_option_id: Option<i64>,
    pub message: String,
}

/// Outcome of an aggregation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationManifest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub combinations_aggregated: usize,
    pub errors: Vec<AggregationIssue>,
    /// The run stopped early; counts cover only the work completed
    pub cancelled: bool,
}

impl AggregationManifest {
    fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            combinations_aggregated: 0,
            errors: Vec::new(),
            cancelled: false,
        }
    }
}

pub struct AggregationEngine {
    records: Arc<dyn NotificationStore>,
    summaries: Arc<dyn SummaryStore>,
    verification: Option<Arc<VerificationEngine>>,
    clock: Arc<dyn Clock>,
    lock_wait_ms: u64,
}

impl AggregationEngine {
    pub fn new(
        records: Arc<dyn NotificationStore>,
        summaries: Arc<dyn SummaryStore>,
        lock_wait_ms: u64,
    ) -> Self {
        Self {
            records,
            summaries,
            verification: None,
            clock: Arc::new(SystemClock),
            lock_wait_ms,
        }
    }

    /// Classify outcomes by verifying each record instead of trusting the
    /// Polaris status
    pub fn with_verification(mut self, engine: Arc<VerificationEngine>) -> Self {
        self.verification = Some(engine);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Aggregate a single day
    pub async fn aggregate_date(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> VerifyResult<AggregationManifest> {
        self.aggregate_range(date, date, cancel).await
    }

    /// Aggregate every day from `start` to `end` inclusive
    pub async fn aggregate_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> VerifyResult<AggregationManifest> {
        check_range(start, end)?;

        let mut manifest = AggregationManifest::new(start, end);
        for date in days_between(start, end) {
            if cancel.is_cancelled() {
                manifest.cancelled = true;
                break;
            }
            self.aggregate_day(date, cancel, &mut manifest).await;
        }

        if manifest.cancelled {
            warn!(
                "Aggregation {}..{} cancelled after {} combinations",
                start, end, manifest.combinations_aggregated
            );
        } else {
            info!(
                "Aggregated {}..{}: {} combinations, {} errors",
                start,
                end,
                manifest.combinations_aggregated,
                manifest.errors.len()
            );
        }

        Ok(manifest)
    }

    /// Rebuild every day that has notification records; `None` when there are none
    pub async fn aggregate_all(
        &self,
        cancel: &CancellationToken,
    ) -> VerifyResult<Option<AggregationManifest>> {
        let Some((first, last)) = self.records.date_bounds().await? else {
            info!("No notification records, nothing to aggregate");
            return Ok(None);
        };
        self.aggregate_range(first, last, cancel).await.map(Some)
    }

    /// Aggregate the day before today
    pub async fn aggregate_yesterday(
        &self,
        cancel: &CancellationToken,
    ) -> VerifyResult<AggregationManifest> {
        let yesterday = self.clock.now().date() - Duration::days(1);
        self.aggregate_date(yesterday, cancel).await
    }

    /// Delete summary rows older than `keep_days`; returns the number removed
    ///
    /// A retention longer than the calendar can express deletes nothing.
    pub async fn cleanup_old_summaries(&self, keep_days: i64) -> VerifyResult<u64> {
        if keep_days < 0 {
            return Err(VerifyError::Common(Error::InvalidInput(format!(
                "keep_days must not be negative, got {}",
                keep_days
            ))));
        }
        let today = self.clock.now().date();
        let Some(cutoff) = Duration::try_days(keep_days).and_then(|d| today.checked_sub_signed(d))
        else {
            info!("Retention of {} days reaches past the calendar, nothing to remove", keep_days);
            return Ok(0);
        };
        let removed = retry_on_lock("delete_summaries_before", self.lock_wait_ms, || {
            self.summaries.delete_summaries_before(cutoff)
        })
        .await?;

        info!("Removed {} summary rows dated before {}", removed, cutoff);
        Ok(removed)
    }

    /// Stored rows for an inclusive date range
    pub async fn summaries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> VerifyResult<Vec<DailySummary>> {
        check_range(from, to)?;
        Ok(self.summaries.summaries_between(from, to).await?)
    }

    /// Column totals over stored rows for an inclusive date range
    pub async fn aggregated_totals(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> VerifyResult<SummaryTotals> {
        check_range(from, to)?;
        Ok(self.summaries.totals_between(from, to).await?)
    }

    async fn aggregate_day(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
        manifest: &mut AggregationManifest,
    ) {
        let (start, end) = day_span(date, date);
        let records = match self.records.records_between(start, end).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to read notification records for {}: {}", date, e);
                manifest.errors.push(AggregationIssue {
                    date,
                    notification_type_id: None,
                    delivery_option_id: None,
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut tallies: BTreeMap<(i64, i64), Tally> = BTreeMap::new();
        for record in &records {
            if cancel.is_cancelled() {
                // A partly counted day is never written
                manifest.cancelled = true;
                return;
            }
            let outcome = self.outcome(record).await;
            tallies
                .entry((record.notification_type_id, record.delivery_option_id))
                .or_default()
                .add(record, outcome);
        }

        debug!(
            "{}: {} records in {} combinations",
            date,
            records.len(),
            tallies.len()
        );

        let aggregated_at = self.clock.now();
        for ((notification_type, channel), tally) in tallies {
            if cancel.is_cancelled() {
                manifest.cancelled = true;
                return;
            }

            let summary = tally.into_summary(date, notification_type, channel, aggregated_at);
            let written = retry_on_lock("upsert_summary", self.lock_wait_ms, || {
                self.summaries.upsert_summary(&summary)
            })
            .await;

            match written {
                Ok(()) => manifest.combinations_aggregated += 1,
                Err(e) => {
                    let failure = VerifyError::AggregationWrite {
                        date,
                        notification_type,
                        channel,
                        message: e.to_string(),
                    };
                    error!("{}", failure);
                    manifest.errors.push(AggregationIssue {
                        date,
                        notification_type_id: Some(notification_type),
                        delivery_option_id: Some(channel),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn outcome(&self, record: &NotificationRecord) -> Outcome {
        match &self.verification {
            Some(engine) => match engine.verify(record).await.overall_status {
                OverallStatus::Success => Outcome::Success,
                OverallStatus::Failed => Outcome::Failed,
                OverallStatus::Partial | OverallStatus::Pending => Outcome::Pending,
            },
            None => Outcome::from_polaris_status(record.notification_status_id),
        }
    }
}

/// Running counts for one combination
#[derive(Debug, Default)]
struct Tally {
    sent: i64,
    success: i64,
    failed: i64,
    pending: i64,
    holds: i64,
    overdues: i64,
    overdues_2nd: i64,
    overdues_3rd: i64,
    cancels: i64,
    recalls: i64,
    bills: i64,
    patrons: HashSet<String>,
}

impl Tally {
    fn add(&mut self, record: &NotificationRecord, outcome: Outcome) {
        self.sent += 1;
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Pending => self.pending += 1,
        }
        self.holds += record.holds_count;
        self.overdues += record.overdues_count;
        self.overdues_2nd += record.overdues_2nd_count;
        self.overdues_3rd += record.overdues_3rd_count;
        self.cancels += record.cancels_count;
        self.recalls += record.recalls_count;
        self.bills += record.bills_count + record.manual_bill_count;
        self.patrons.insert(record.patron_key());
    }

    fn into_summary(
        self,
        summary_date: NaiveDate,
        notification_type_id: i64,
        delivery_option_id: i64,
        aggregated_at: NaiveDateTime,
    ) -> DailySummary {
        let rate = |count: i64| {
            if self.sent == 0 {
                0.0
            } else {
                round2(count as f64 / self.sent as f64 * 100.0)
            }
        };

        DailySummary {
            summary_date,
            notification_type_id,
            delivery_option_id,
            total_sent: self.sent,
            total_success: self.success,
            total_failed: self.failed,
            total_pending: self.pending,
            total_holds: self.holds,
            total_overdues: self.overdues,
            total_overdues_2nd: self.overdues_2nd,
            total_overdues_3rd: self.overdues_3rd,
            total_cancels: self.cancels,
            total_recalls: self.recalls,
            total_bills: self.bills,
            unique_patrons: self.patrons.len() as i64,
            success_rate: rate(self.success),
            failure_rate: rate(self.failed),
            aggregated_at,
        }
    }
}
