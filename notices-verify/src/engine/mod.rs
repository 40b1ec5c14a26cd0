//! Verification engine
//!
//! Dispatches each notification record to its channel verifier, turns feed
//! failures into diagnostic timeline notes, and derives the overall status.
//! Single-record verification never fails; bulk queries fail only when the
//! record store itself cannot be read, the range is invalid, or the caller
//! cancels.

mod troubleshoot;

pub use troubleshoot::{
    ChannelStatistics, FailureGroup, Mismatch, MismatchKind, TroubleshootingSummary,
    UNVERIFIED_REASON,
};

use crate::error::{VerifyError, VerifyResult};
use crate::result::{StatusInputs, TimelineEvent, VerificationResult};
use crate::store::{EvidenceFeeds, NotificationStore};
use crate::verifier::VerifierRegistry;
use chrono::{NaiveDate, NaiveDateTime};
use notices_common::config::EngineConfig;
use notices_common::db::NotificationRecord;
use notices_common::time::{day_span, Clock, SystemClock};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A record together with its verification result
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedNotice {
    pub record: NotificationRecord,
    pub result: VerificationResult,
}

pub struct VerificationEngine {
    records: Arc<dyn NotificationStore>,
    feeds: Arc<dyn EvidenceFeeds>,
    registry: VerifierRegistry,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl VerificationEngine {
    pub fn new(
        records: Arc<dyn NotificationStore>,
        feeds: Arc<dyn EvidenceFeeds>,
        registry: VerifierRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            records,
            feeds,
            registry,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock used for grace-period evaluation
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &VerifierRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Verify one record against every feed its channel has
    pub async fn verify(&self, record: &NotificationRecord) -> VerificationResult {
        let mut result = VerificationResult::new(record);
        let mut inputs = StatusInputs {
            record_time: record.notification_date,
            evaluated_at: self.clock.now(),
            grace_period: self.config.grace_period(),
            confirms_delivery: false,
        };

        let Some(verifier) = self.registry.find(record) else {
            let missing = VerifyError::MissingVerifier {
                channel: record.delivery_option_id,
            };
            debug!(record_id = record.id, "{}", missing);
            result.finalize(&inputs);
            return result;
        };

        inputs.confirms_delivery = verifier.confirms_delivery();

        if let Err(e) = verifier
            .verify(record, self.feeds.as_ref(), &mut result)
            .await
        {
            let source = match &e {
                VerifyError::FeedUnavailable { feed, .. } => *feed,
                _ => verifier.name(),
            };
            warn!(
                record_id = record.id,
                verifier = verifier.name(),
                "Verification incomplete: {}",
                e
            );
            result.push_event(TimelineEvent::feed_error(
                record.notification_date,
                source,
                e.to_string(),
            ));
        }

        result.finalize(&inputs);
        result
    }

    /// Load and verify a record by id; `None` when it does not exist
    pub async fn verify_by_id(&self, id: i64) -> VerifyResult<Option<VerifiedNotice>> {
        let Some(record) = self.records.record(id).await? else {
            return Ok(None);
        };
        let result = self.verify(&record).await;
        Ok(Some(VerifiedNotice { record, result }))
    }

    /// Verify every record for a patron, newest first.
    ///
    /// Both dates bound an inclusive day range; a single date selects that day
    /// only; neither selects the patron's whole history.
    pub async fn verify_for_patron(
        &self,
        patron_barcode: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<VerifiedNotice>> {
        let (start, end) = match (from, to) {
            (Some(from), Some(to)) => {
                check_range(from, to)?;
                let (start, end) = day_span(from, to);
                (Some(start), Some(end))
            }
            (Some(day), None) | (None, Some(day)) => {
                let (start, end) = day_span(day, day);
                (Some(start), Some(end))
            }
            (None, None) => (None, None),
        };

        let records = self
            .records
            .records_for_patron(patron_barcode, start, end)
            .await?;
        debug!(
            "Verifying {} records for patron {}",
            records.len(),
            patron_barcode
        );

        self.verify_all(records, cancel).await
    }

    /// Verify every record dated within `[from, to]`, oldest first
    pub async fn verify_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<VerifiedNotice>> {
        check_range(from, to)?;
        let (start, end) = day_span(from, to);
        let records = self.records.records_between(start, end).await?;
        info!(
            "Verifying {} records from {} to {}",
            records.len(),
            from,
            to
        );
        self.verify_all(records, cancel).await
    }

    /// Resolve optional query bounds, defaulting to the configured lookback
    /// ending today
    pub fn resolve_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> VerifyResult<(NaiveDate, NaiveDate)> {
        let to = to.unwrap_or_else(|| self.clock.now().date());
        let from = from.unwrap_or(to - self.config.default_lookback());
        check_range(from, to)?;
        Ok((from, to))
    }

    /// Clock reading, exposed for callers that stamp results
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    async fn verify_all(
        &self,
        records: Vec<NotificationRecord>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<VerifiedNotice>> {
        let mut verified = Vec::with_capacity(records.len());
        for record in records {
            if cancel.is_cancelled() {
                info!("Verification cancelled after {} records", verified.len());
                return Err(VerifyError::Cancelled);
            }
            let result = self.verify(&record).await;
            verified.push(VerifiedNotice { record, result });
        }
        Ok(verified)
    }
}

pub(crate) fn check_range(from: NaiveDate, to: NaiveDate) -> VerifyResult<()> {
    if from > to {
        return Err(VerifyError::InvalidRange { from, to });
    }
    Ok(())
}
