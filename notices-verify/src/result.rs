//! Verification result and timeline model
//!
//! A `VerificationResult` is rebuilt from scratch on every query and never
//! persisted. Verifiers only append `TimelineEvent`s; every summary field
//! (submitted/verified/delivered, their timestamps, failure reason) and the
//! overall status are derived from the timeline, so the same evidence always
//! produces the same result.

use crate::store::FEED_NOTIFICATION_LOGS;
use chrono::{Duration, NaiveDateTime};
use notices_common::db::NotificationRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a notice's journey confirmed by one feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Found in the submission feed sent to the provider
    Submitted,
    /// Independently confirmed by the ILS export
    Verified,
    /// Provider reported an outcome (delivered or failed)
    Delivered,
    /// A feed could not be read; evidence is incomplete
    FeedError,
}

/// One confirmed stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub kind: EventKind,
    pub timestamp: NaiveDateTime,
    /// Feed (table) the evidence came from
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl TimelineEvent {
    fn new(kind: EventKind, timestamp: NaiveDateTime, source: &str) -> Self {
        Self {
            kind,
            timestamp,
            source: source.to_string(),
            file: None,
            status: None,
            failure_reason: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn submitted(timestamp: NaiveDateTime, source: &str, file: Option<String>) -> Self {
        Self {
            file,
            ..Self::new(EventKind::Submitted, timestamp, source)
        }
    }

    pub fn verified(timestamp: NaiveDateTime, source: &str, file: Option<String>) -> Self {
        Self {
            file,
            ..Self::new(EventKind::Verified, timestamp, source)
        }
    }

    /// Provider outcome; a `failure_reason` marks the delivery as failed
    pub fn delivered(
        timestamp: NaiveDateTime,
        source: &str,
        status: &str,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            status: Some(status.to_string()),
            failure_reason,
            ..Self::new(EventKind::Delivered, timestamp, source)
        }
    }

    pub fn feed_error(timestamp: NaiveDateTime, source: &str, message: String) -> Self {
        Self {
            details: serde_json::json!({ "error": message }),
            ..Self::new(EventKind::FeedError, timestamp, source)
        }
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Derived single-value summary of a notice's verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Partial,
    Pending,
    Failed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Partial => "partial",
            OverallStatus::Pending => "pending",
            OverallStatus::Failed => "failed",
        }
    }

    /// Derive the status from a timeline.
    ///
    /// Precedence:
    /// 1. provider outcome present: failed with a reason, success without
    /// 2. any unreadable feed: pending
    /// 3. verified on a channel with no delivery feed: success
    /// 4. submitted, never verified, grace period exceeded: failed
    /// 5. verified: partial (awaiting provider outcome)
    /// 6. otherwise pending
    pub fn derive(timeline: &[TimelineEvent], inputs: &StatusInputs) -> Self {
        let has = |kind: EventKind| timeline.iter().any(|e| e.kind == kind);

        if let Some(delivery) = timeline.iter().find(|e| e.kind == EventKind::Delivered) {
            return if delivery.failure_reason.is_some() {
                OverallStatus::Failed
            } else {
                OverallStatus::Success
            };
        }

        if has(EventKind::FeedError) {
            return OverallStatus::Pending;
        }

        let submitted = has(EventKind::Submitted);
        let verified = has(EventKind::Verified);

        if verified && !inputs.confirms_delivery {
            return OverallStatus::Success;
        }

        if submitted && !verified && inputs.evaluated_at - inputs.record_time > inputs.grace_period {
            return OverallStatus::Failed;
        }

        if verified {
            return OverallStatus::Partial;
        }

        OverallStatus::Pending
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything besides the timeline that status derivation depends on
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs {
    pub record_time: NaiveDateTime,
    pub evaluated_at: NaiveDateTime,
    pub grace_period: Duration,
    /// The channel has a feed that positively confirms delivery
    pub confirms_delivery: bool,
}

/// Per-notice verification outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub record_id: i64,
    pub created_at: NaiveDateTime,

    pub submitted: bool,
    pub submitted_at: Option<NaiveDateTime>,
    pub submission_file: Option<String>,

    pub verified: bool,
    pub verified_at: Option<NaiveDateTime>,
    pub verification_file: Option<String>,

    pub delivered: bool,
    pub delivered_at: Option<NaiveDateTime>,
    pub delivery_status: Option<String>,
    pub failure_reason: Option<String>,

    pub overall_status: OverallStatus,
    timeline: Vec<TimelineEvent>,
}

impl VerificationResult {
    /// Empty, pending result for a record
    pub fn new(record: &NotificationRecord) -> Self {
        Self {
            record_id: record.id,
            created_at: record.notification_date,
            submitted: false,
            submitted_at: None,
            submission_file: None,
            verified: false,
            verified_at: None,
            verification_file: None,
            delivered: false,
            delivered_at: None,
            delivery_status: None,
            failure_reason: None,
            overall_status: OverallStatus::Pending,
            timeline: Vec::new(),
        }
    }

    /// Ordered, append-only event list
    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    /// Append an event, keeping the timeline ordered by timestamp.
    ///
    /// Events with equal timestamps keep their insertion order.
    pub fn push_event(&mut self, event: TimelineEvent) {
        let position = self
            .timeline
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.timeline.insert(position, event);
        self.refresh();
    }

    /// True when a feed read failed while building this result
    pub fn is_incomplete(&self) -> bool {
        self.timeline.iter().any(|e| e.kind == EventKind::FeedError)
    }

    /// True when a delivery outcome came from a provider feed rather than
    /// from the ILS's own status column
    pub fn has_provider_delivery(&self) -> bool {
        self.timeline
            .iter()
            .any(|e| e.kind == EventKind::Delivered && e.source != FEED_NOTIFICATION_LOGS)
    }

    /// Compute the overall status from the timeline
    pub fn finalize(&mut self, inputs: &StatusInputs) {
        self.overall_status = OverallStatus::derive(&self.timeline, inputs);
    }

    fn first(&self, kind: EventKind) -> Option<&TimelineEvent> {
        self.timeline.iter().find(|e| e.kind == kind)
    }

    fn refresh(&mut self) {
        let submission = self.first(EventKind::Submitted).cloned();
        let verification = self.first(EventKind::Verified).cloned();
        let delivery = self.first(EventKind::Delivered).cloned();

        self.submitted = submission.is_some();
        self.submitted_at = submission.as_ref().map(|e| e.timestamp);
        self.submission_file = submission.and_then(|e| e.file);

        self.verified = verification.is_some();
        self.verified_at = verification.as_ref().map(|e| e.timestamp);
        self.verification_file = verification.and_then(|e| e.file);

        self.delivered = delivery.is_some();
        self.delivered_at = delivery.as_ref().map(|e| e.timestamp);
        self.delivery_status = delivery.as_ref().and_then(|e| e.status.clone());
        self.failure_reason = delivery.and_then(|e| e.failure_reason);
    }

    /// Human-readable status line
    pub fn status_message(&self) -> String {
        match self.overall_status {
            OverallStatus::Success => "Notice verified and delivered successfully".to_string(),
            OverallStatus::Failed => match &self.failure_reason {
                Some(reason) => format!("Notice delivery failed: {}", reason),
                None if self.submitted && !self.verified => {
                    "Notice submitted but never verified".to_string()
                }
                None => "Notice delivery failed".to_string(),
            },
            OverallStatus::Partial => "Notice verified, delivery report pending".to_string(),
            OverallStatus::Pending if self.is_incomplete() => {
                "Verification incomplete: an evidence feed could not be read".to_string()
            }
            OverallStatus::Pending if self.submitted => {
                "Notice submitted, awaiting verification".to_string()
            }
            OverallStatus::Pending => "Notice created but not yet submitted".to_string(),
        }
    }
}
