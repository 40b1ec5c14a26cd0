// Channel verifiers
//
// One verifier per delivery channel family. Each joins a notification record
// against the evidence feeds its channel produces and appends timeline events.

use crate::error::{VerifyError, VerifyResult};
use crate::result::VerificationResult;
use crate::store::EvidenceFeeds;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use notices_common::db::NotificationRecord;
use tracing::{debug, warn};

pub mod email;
pub mod mail;
pub mod phone;
pub mod registry;

pub use email::EmailNoticeVerifier;
pub use mail::MailNoticeVerifier;
pub use phone::PhoneNoticeVerifier;
pub use registry::VerifierRegistry;

/// Verifier trait - every channel strategy implements this
#[async_trait]
pub trait ChannelVerifier: Send + Sync {
    /// Verifier identifier used in the channel table (e.g., "phone", "email")
    fn name(&self) -> &'static str;

    /// Delivery option codes this verifier is registered for
    fn channel_codes(&self) -> &[i64];

    /// Whether this verifier handles the record
    fn can_handle(&self, record: &NotificationRecord) -> bool {
        self.channel_codes().contains(&record.delivery_option_id)
    }

    /// True when the channel has a provider feed that positively confirms
    /// delivery; without one, verification alone is terminal success
    fn confirms_delivery(&self) -> bool {
        false
    }

    /// True when notices on this channel are expected in the submission feed
    fn has_submission_feed(&self) -> bool {
        false
    }

    /// Append evidence for `record` to `result`
    ///
    /// Events appended before an error are kept. An `Err` means some feed
    /// could not be read and the evidence is incomplete.
    async fn verify(
        &self,
        record: &NotificationRecord,
        feeds: &dyn EvidenceFeeds,
        result: &mut VerificationResult,
    ) -> VerifyResult<()>;
}

/// Time window around a record in which provider reports are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindow {
    pub before: Duration,
    pub after: Duration,
}

impl DeliveryWindow {
    pub fn new(before: Duration, after: Duration) -> Self {
        Self { before, after }
    }

    /// Inclusive `(start, end)` bounds around `timestamp`
    pub fn around(&self, timestamp: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        (timestamp - self.before, timestamp + self.after)
    }
}

impl Default for DeliveryWindow {
    fn default() -> Self {
        Self::new(Duration::minutes(120), Duration::minutes(24 * 60))
    }
}

/// Pick the first (earliest) row of an ordered feed result.
///
/// Several rows are normal for feeds listing one line per item (`expected`);
/// anywhere else they mean the join was ambiguous and get a warning.
pub(crate) fn first_match<T>(
    feed: &'static str,
    record_id: i64,
    rows: Vec<T>,
    expected: bool,
) -> Option<T> {
    if rows.len() > 1 {
        let ambiguity = VerifyError::AmbiguousMatch {
            feed,
            record_id,
            candidates: rows.len(),
        };
        if expected {
            debug!("{} (using earliest)", ambiguity);
        } else {
            warn!("{} (using earliest)", ambiguity);
        }
    }
    rows.into_iter().next()
}

/// Non-blank, trimmed value of an optional contact field
pub(crate) fn contact(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
