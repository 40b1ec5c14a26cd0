//! Voice and SMS verification
//!
//! Three-stage join:
//! 1. submission file row (barcode, submission type, same day)
//! 2. Polaris phone-notice export row (barcode, same day, item when known)
//! 3. provider delivery report (phone number, inside the delivery window)

use super::{contact, first_match, ChannelVerifier, DeliveryWindow};
use crate::error::{VerifyError, VerifyResult};
use crate::result::{TimelineEvent, VerificationResult};
use crate::store::{EvidenceFeeds, FEED_DELIVERIES, FEED_PHONE_NOTICES, FEED_SUBMISSIONS};
use async_trait::async_trait;
use notices_common::codes::{submission_type_for, DELIVERY_SMS, DELIVERY_VOICE};
use notices_common::db::NotificationRecord;
use notices_common::DeliveryStatus;
use serde_json::json;
use tracing::debug;

pub struct PhoneNoticeVerifier {
    codes: Vec<i64>,
    window: DeliveryWindow,
}

impl PhoneNoticeVerifier {
    pub const NAME: &'static str = "phone";

    pub fn new(codes: Vec<i64>, window: DeliveryWindow) -> Self {
        Self { codes, window }
    }
}

impl Default for PhoneNoticeVerifier {
    fn default() -> Self {
        Self::new(vec![DELIVERY_VOICE, DELIVERY_SMS], DeliveryWindow::default())
    }
}

#[async_trait]
impl ChannelVerifier for PhoneNoticeVerifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn channel_codes(&self) -> &[i64] {
        &self.codes
    }

    fn confirms_delivery(&self) -> bool {
        true
    }

    fn has_submission_feed(&self) -> bool {
        true
    }

    async fn verify(
        &self,
        record: &NotificationRecord,
        feeds: &dyn EvidenceFeeds,
        result: &mut VerificationResult,
    ) -> VerifyResult<()> {
        let day = record.notification_date.date();

        if let Some(barcode) = record.barcode() {
            match submission_type_for(record.notification_type_id) {
                Some(submission_type) => {
                    let rows = feeds
                        .submissions_on(barcode, submission_type, day)
                        .await
                        .map_err(|e| VerifyError::feed(FEED_SUBMISSIONS, e))?;

                    // Submission files carry one line per item
                    if let Some(submission) = first_match(FEED_SUBMISSIONS, record.id, rows, true)
                    {
                        result.push_event(
                            TimelineEvent::submitted(
                                submission.submitted_at,
                                FEED_SUBMISSIONS,
                                Some(submission.source_file),
                            )
                            .with_details(json!({
                                "notification_type": submission.notification_type,
                                "phone_number": submission.phone_number,
                                "delivery_type": submission.delivery_type,
                            })),
                        );
                    }
                }
                None => debug!(
                    record_id = record.id,
                    notification_type = record.notification_type_id,
                    "Notification type is never submitted, skipping submission join"
                ),
            }

            let rows = feeds
                .phone_notices_on(barcode, day, contact(record.item_barcode.as_deref()))
                .await
                .map_err(|e| VerifyError::feed(FEED_PHONE_NOTICES, e))?;

            if let Some(notice) = first_match(FEED_PHONE_NOTICES, record.id, rows, false) {
                result.push_event(
                    TimelineEvent::verified(notice.notice_date, FEED_PHONE_NOTICES, notice.source_file)
                        .with_details(json!({
                            "delivery_type": notice.delivery_type,
                            "phone_number": notice.phone_number,
                            "item_barcode": notice.item_barcode,
                        })),
                );
            }
        } else {
            debug!(record_id = record.id, "No patron barcode, skipping barcode joins");
        }

        let Some(phone) = contact(record.phone.as_deref()) else {
            debug!(record_id = record.id, "No phone number, skipping delivery join");
            return Ok(());
        };

        let (start, end) = self.window.around(record.notification_date);
        let rows: Vec<_> = feeds
            .deliveries_between(phone, start, end)
            .await
            .map_err(|e| VerifyError::feed(FEED_DELIVERIES, e))?
            .into_iter()
            .filter(|d| d.delivery_status() != DeliveryStatus::Pending)
            .collect();

        if let Some(delivery) = first_match(FEED_DELIVERIES, record.id, rows, false) {
            let status = delivery.delivery_status();
            result.push_event(
                TimelineEvent::delivered(
                    delivery.sent_date,
                    FEED_DELIVERIES,
                    status.as_str(),
                    delivery.effective_failure_reason(),
                )
                .with_file(delivery.report_file.clone())
                .with_details(json!({
                    "carrier": delivery.carrier,
                    "delivery_type": delivery.delivery_type,
                })),
            );
        }

        Ok(())
    }
}
