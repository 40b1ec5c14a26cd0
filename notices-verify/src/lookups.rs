//! Derived lookups for report display

use crate::store::EvidenceFeeds;
use chrono::Duration;
use notices_common::db::{NotificationRecord, PhoneNotice};
use tracing::debug;

pub const UNKNOWN_PATRON: &str = "Unknown Patron";

/// Display name for the patron behind a record.
///
/// The notification log carries no names; the phone-notice export does. The
/// latest notice within `window` of the record wins, then the latest on the
/// same day. Without either, the barcode stands in for the name.
pub async fn patron_name(
    record: &NotificationRecord,
    feeds: &dyn EvidenceFeeds,
    window: Duration,
) -> String {
    let Some(barcode) = record.barcode() else {
        return UNKNOWN_PATRON.to_string();
    };

    let at = record.notification_date;
    match feeds
        .phone_notices_between(barcode, at - window, at + window)
        .await
    {
        Ok(notices) => {
            if let Some(name) = latest_name(&notices) {
                return name;
            }
        }
        Err(e) => debug!(record_id = record.id, "Patron name lookup failed: {}", e),
    }

    match feeds.phone_notices_on(barcode, at.date(), None).await {
        Ok(notices) => {
            if let Some(name) = latest_name(&notices) {
                return name;
            }
        }
        Err(e) => debug!(record_id = record.id, "Patron name lookup failed: {}", e),
    }

    barcode.to_string()
}

fn latest_name(notices: &[PhoneNotice]) -> Option<String> {
    notices.iter().rev().find_map(display_name)
}

fn display_name(notice: &PhoneNotice) -> Option<String> {
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match (clean(&notice.last_name), clean(&notice.first_name)) {
        (Some(last), Some(first)) => Some(format!("{}, {}", last, first)),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}
