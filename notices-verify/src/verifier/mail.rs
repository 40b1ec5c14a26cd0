//! Printed mail verification
//!
//! There is no provider feed for mail; a "Mail Printed" status on the record
//! is the only evidence available.

use super::ChannelVerifier;
use crate::error::VerifyResult;
use crate::result::{TimelineEvent, VerificationResult};
use crate::store::{EvidenceFeeds, FEED_NOTIFICATION_LOGS};
use async_trait::async_trait;
use notices_common::codes::{DELIVERY_MAIL, STATUS_MAIL_PRINTED};
use notices_common::db::NotificationRecord;

pub struct MailNoticeVerifier {
    codes: Vec<i64>,
}

impl MailNoticeVerifier {
    pub const NAME: &'static str = "mail";

    pub fn new(codes: Vec<i64>) -> Self {
        Self { codes }
    }
}

impl Default for MailNoticeVerifier {
    fn default() -> Self {
        Self::new(vec![DELIVERY_MAIL])
    }
}

#[async_trait]
impl ChannelVerifier for MailNoticeVerifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn channel_codes(&self) -> &[i64] {
        &self.codes
    }

    async fn verify(
        &self,
        record: &NotificationRecord,
        _feeds: &dyn EvidenceFeeds,
        result: &mut VerificationResult,
    ) -> VerifyResult<()> {
        if record.notification_status_id == STATUS_MAIL_PRINTED {
            result.push_event(TimelineEvent::verified(
                record.notification_date,
                FEED_NOTIFICATION_LOGS,
                None,
            ));
        }
        Ok(())
    }
}
