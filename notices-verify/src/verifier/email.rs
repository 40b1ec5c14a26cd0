//! Email verification
//!
//! The ILS records the send outcome itself: "Email Completed" counts as
//! verification, the two "Email Failed" statuses as a failed outcome. The
//! bounce feed only ever reports failures and takes precedence when present.

use super::{contact, first_match, ChannelVerifier, DeliveryWindow};
use crate::error::{VerifyError, VerifyResult};
use crate::result::{TimelineEvent, VerificationResult};
use crate::store::{EvidenceFeeds, FEED_EMAIL_FAILURES, FEED_NOTIFICATION_LOGS};
use async_trait::async_trait;
use notices_common::codes::{
    DELIVERY_EMAIL, STATUS_EMAIL_COMPLETED, STATUS_EMAIL_FAILED, STATUS_EMAIL_INVALID,
};
use notices_common::db::NotificationRecord;
use notices_common::DeliveryStatus;
use serde_json::json;

pub struct EmailNoticeVerifier {
    codes: Vec<i64>,
    window: DeliveryWindow,
}

impl EmailNoticeVerifier {
    pub const NAME: &'static str = "email";

    pub fn new(codes: Vec<i64>, window: DeliveryWindow) -> Self {
        Self { codes, window }
    }
}

impl Default for EmailNoticeVerifier {
    fn default() -> Self {
        Self::new(vec![DELIVERY_EMAIL], DeliveryWindow::default())
    }
}

#[async_trait]
impl ChannelVerifier for EmailNoticeVerifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn channel_codes(&self) -> &[i64] {
        &self.codes
    }

    async fn verify(
        &self,
        record: &NotificationRecord,
        feeds: &dyn EvidenceFeeds,
        result: &mut VerificationResult,
    ) -> VerifyResult<()> {
        if record.notification_status_id == STATUS_EMAIL_COMPLETED {
            result.push_event(
                TimelineEvent::verified(record.notification_date, FEED_NOTIFICATION_LOGS, None)
                    .with_details(json!({ "status": record.status_description() })),
            );
        }

        if let Some(address) = contact(record.email.as_deref()) {
            let (start, end) = self.window.around(record.notification_date);
            let rows = feeds
                .email_failures_between(address, start, end)
                .await
                .map_err(|e| VerifyError::feed(FEED_EMAIL_FAILURES, e))?;

            if let Some(bounce) = first_match(FEED_EMAIL_FAILURES, record.id, rows, false) {
                let reason = bounce
                    .failure_reason
                    .clone()
                    .or_else(|| bounce.error_code.clone())
                    .unwrap_or_else(|| "Bounced".to_string());
                result.push_event(
                    TimelineEvent::delivered(
                        bounce.received_at,
                        FEED_EMAIL_FAILURES,
                        DeliveryStatus::Failed.as_str(),
                        Some(reason),
                    )
                    .with_details(json!({ "error_code": bounce.error_code })),
                );
                return Ok(());
            }
        }

        if matches!(
            record.notification_status_id,
            STATUS_EMAIL_INVALID | STATUS_EMAIL_FAILED
        ) {
            let reason = record
                .status_description()
                .unwrap_or("Email Failed")
                .to_string();
            result.push_event(TimelineEvent::delivered(
                record.notification_date,
                FEED_NOTIFICATION_LOGS,
                DeliveryStatus::Failed.as_str(),
                Some(reason),
            ));
        }

        Ok(())
    }
}
