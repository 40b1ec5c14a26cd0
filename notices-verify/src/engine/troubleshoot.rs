//! Troubleshooting reports over verified notices
//!
//! Everything here re-verifies the records in a date range and summarizes
//! the results; nothing is persisted.

use super::{VerificationEngine, VerifiedNotice};
use crate::error::VerifyResult;
use crate::result::OverallStatus;
use chrono::NaiveDate;
use notices_common::codes::{delivery_option_name, notification_type_name};
use notices_common::time::{round1, round2};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;

/// Label for failures that have no provider reason (grace period expired)
pub const UNVERIFIED_REASON: &str = "Not verified within grace period";

/// Failures sharing a label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureGroup {
    pub label: String,
    pub count: usize,
    /// Share of all failures in the range, one decimal place
    pub percentage: f64,
}

/// Evidence that contradicts the expected stage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Seen by the ILS export but never in a submission file
    VerifiedNotSubmitted,
    /// Provider reported an outcome the ILS never confirmed
    DeliveredNotVerified,
}

impl MismatchKind {
    /// Classify a notice; `has_submission_feed` is false for channels whose
    /// notices never appear in a submission file.
    ///
    /// Outcomes the ILS recorded about itself (email failure statuses) are
    /// not provider reports and never count as delivered-not-verified.
    pub fn detect(notice: &VerifiedNotice, has_submission_feed: bool) -> Option<Self> {
        let result = &notice.result;
        if has_submission_feed && result.verified && !result.submitted {
            Some(MismatchKind::VerifiedNotSubmitted)
        } else if result.has_provider_delivery() && !result.verified {
            Some(MismatchKind::DeliveredNotVerified)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    #[serde(flatten)]
    pub notice: VerifiedNotice,
}

/// Status counts over a date range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TroubleshootingSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total: usize,
    pub success: usize,
    pub partial: usize,
    pub pending: usize,
    pub failed: usize,
    /// Pending because a feed could not be read
    pub incomplete: usize,
    pub success_rate: f64,
    pub verified_not_submitted: usize,
    pub delivered_not_verified: usize,
}

/// Outcome counts for one delivery option
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatistics {
    pub delivery_option_id: i64,
    pub channel: String,
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Pending and partial
    pub pending: usize,
    pub success_rate: f64,
}

impl VerificationEngine {
    /// Failed notices in the range, optionally filtered by a case-insensitive
    /// substring of the failure reason
    pub async fn failures(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        reason: Option<&str>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<VerifiedNotice>> {
        let (from, to) = self.resolve_range(from, to)?;
        let needle = reason.map(str::to_lowercase);

        let failures = self
            .verify_range(from, to, cancel)
            .await?
            .into_iter()
            .filter(|n| n.result.overall_status == OverallStatus::Failed)
            .filter(|n| match &needle {
                Some(needle) => n
                    .result
                    .failure_reason
                    .as_deref()
                    .is_some_and(|r| r.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .collect();

        Ok(failures)
    }

    /// Failures grouped by reason, largest group first
    pub async fn failures_by_reason(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<FailureGroup>> {
        let failures = self.failures(from, to, None, cancel).await?;
        Ok(group_failures(&failures, |n| {
            n.result
                .failure_reason
                .clone()
                .unwrap_or_else(|| UNVERIFIED_REASON.to_string())
        }))
    }

    /// Failures grouped by notification type, largest group first
    pub async fn failures_by_type(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<FailureGroup>> {
        let failures = self.failures(from, to, None, cancel).await?;
        Ok(group_failures(&failures, |n| {
            notification_type_name(n.record.notification_type_id)
        }))
    }

    /// Notices whose evidence skips a stage
    pub async fn mismatches(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<Mismatch>> {
        let (from, to) = self.resolve_range(from, to)?;
        let notices = self.verify_range(from, to, cancel).await?;

        let mismatches = notices
            .into_iter()
            .filter_map(|notice| {
                let kind = MismatchKind::detect(&notice, self.has_submission_feed(&notice))?;
                Some(Mismatch { kind, notice })
            })
            .collect();

        Ok(mismatches)
    }

    /// Status and mismatch counts for the range
    pub async fn troubleshooting_summary(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<TroubleshootingSummary> {
        let (from, to) = self.resolve_range(from, to)?;
        let notices = self.verify_range(from, to, cancel).await?;

        let mut summary = TroubleshootingSummary {
            from,
            to,
            total: notices.len(),
            success: 0,
            partial: 0,
            pending: 0,
            failed: 0,
            incomplete: 0,
            success_rate: 0.0,
            verified_not_submitted: 0,
            delivered_not_verified: 0,
        };

        for notice in &notices {
            match notice.result.overall_status {
                OverallStatus::Success => summary.success += 1,
                OverallStatus::Partial => summary.partial += 1,
                OverallStatus::Pending => summary.pending += 1,
                OverallStatus::Failed => summary.failed += 1,
            }
            if notice.result.is_incomplete() {
                summary.incomplete += 1;
            }
            match MismatchKind::detect(notice, self.has_submission_feed(notice)) {
                Some(MismatchKind::VerifiedNotSubmitted) => summary.verified_not_submitted += 1,
                Some(MismatchKind::DeliveredNotVerified) => summary.delivered_not_verified += 1,
                None => {}
            }
        }

        summary.success_rate = percentage(summary.success, summary.total, round2);
        Ok(summary)
    }

    /// Outcome counts per delivery option, ordered by code
    pub async fn channel_statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> VerifyResult<Vec<ChannelStatistics>> {
        let (from, to) = self.resolve_range(from, to)?;
        let notices = self.verify_range(from, to, cancel).await?;

        let mut by_channel: BTreeMap<i64, ChannelStatistics> = BTreeMap::new();
        for notice in &notices {
            let code = notice.record.delivery_option_id;
            let stats = by_channel.entry(code).or_insert_with(|| ChannelStatistics {
                delivery_option_id: code,
                channel: delivery_option_name(code),
                sent: 0,
                delivered: 0,
                failed: 0,
                pending: 0,
                success_rate: 0.0,
            });
            stats.sent += 1;
            match notice.result.overall_status {
                OverallStatus::Success => stats.delivered += 1,
                OverallStatus::Failed => stats.failed += 1,
                OverallStatus::Partial | OverallStatus::Pending => stats.pending += 1,
            }
        }

        Ok(by_channel
            .into_values()
            .map(|mut stats| {
                stats.success_rate = percentage(stats.delivered, stats.sent, round2);
                stats
            })
            .collect())
    }

    fn has_submission_feed(&self, notice: &VerifiedNotice) -> bool {
        self.registry()
            .find(&notice.record)
            .is_some_and(|v| v.has_submission_feed())
    }
}

fn group_failures<F>(failures: &[VerifiedNotice], label: F) -> Vec<FailureGroup>
where
    F: Fn(&VerifiedNotice) -> String,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for notice in failures {
        *counts.entry(label(notice)).or_default() += 1;
    }

    let total = failures.len();
    let mut groups: Vec<FailureGroup> = counts
        .into_iter()
        .map(|(label, count)| FailureGroup {
            label,
            count,
            percentage: percentage(count, total, round1),
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    groups
}

fn percentage(part: usize, total: usize, round: fn(f64) -> f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round(part as f64 / total as f64 * 100.0)
}
