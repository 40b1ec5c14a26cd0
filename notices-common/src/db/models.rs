//! Database models
//!
//! Rows of the canonical notification log and of the evidence feeds are
//! populated by import jobs and only read here. `DailySummary` is the one
//! table this workspace writes.

use crate::codes::{notification_status_name, DeliveryStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One issued notification (`notification_logs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub polaris_log_id: Option<i64>,
    pub patron_id: Option<i64>,
    pub patron_barcode: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub item_barcode: Option<String>,
    pub notification_date: NaiveDateTime,
    pub notification_type_id: i64,
    pub delivery_option_id: i64,
    pub notification_status_id: i64,
    pub holds_count: i64,
    pub overdues_count: i64,
    pub overdues_2nd_count: i64,
    pub overdues_3rd_count: i64,
    pub cancels_count: i64,
    pub recalls_count: i64,
    pub bills_count: i64,
    pub manual_bill_count: i64,
    pub reported: bool,
}

impl NotificationRecord {
    /// Minimal record; counts zeroed, status unknown
    pub fn new(
        id: i64,
        patron_barcode: &str,
        notification_type_id: i64,
        delivery_option_id: i64,
        notification_date: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            polaris_log_id: None,
            patron_id: None,
            patron_barcode: Some(patron_barcode.to_string()),
            phone: None,
            email: None,
            item_barcode: None,
            notification_date,
            notification_type_id,
            delivery_option_id,
            notification_status_id: 0,
            holds_count: 0,
            overdues_count: 0,
            overdues_2nd_count: 0,
            overdues_3rd_count: 0,
            cancels_count: 0,
            recalls_count: 0,
            bills_count: 0,
            manual_bill_count: 0,
            reported: false,
        }
    }

    /// Non-empty barcode, if any
    pub fn barcode(&self) -> Option<&str> {
        self.patron_barcode
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn total_items(&self) -> i64 {
        self.holds_count
            + self.overdues_count
            + self.overdues_2nd_count
            + self.overdues_3rd_count
            + self.cancels_count
            + self.recalls_count
            + self.bills_count
            + self.manual_bill_count
    }

    pub fn status_description(&self) -> Option<&'static str> {
        notification_status_name(self.notification_status_id)
    }

    /// Key used for unique-patron counting
    pub fn patron_key(&self) -> String {
        match (self.barcode(), self.patron_id) {
            (Some(barcode), _) => barcode.to_string(),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => format!("record:{}", self.id),
        }
    }
}

/// Submission feed row (`shoutbomb_submissions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: i64,
    pub notification_type: String,
    pub patron_barcode: String,
    pub phone_number: String,
    pub item_id: Option<String>,
    pub submitted_at: NaiveDateTime,
    pub source_file: String,
    pub delivery_type: Option<String>,
}

/// Independent verification feed row (`polaris_phone_notices`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhoneNotice {
    pub id: i64,
    pub delivery_type: String,
    pub patron_barcode: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: String,
    pub item_barcode: Option<String>,
    pub notice_date: NaiveDateTime,
    pub source_file: Option<String>,
}

/// Delivery-status feed row (`shoutbomb_deliveries`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: i64,
    pub patron_barcode: Option<String>,
    pub phone_number: String,
    pub delivery_type: String,
    pub sent_date: NaiveDateTime,
    pub status: String,
    pub carrier: Option<String>,
    pub failure_reason: Option<String>,
    pub report_file: Option<String>,
}

impl Delivery {
    pub fn delivery_status(&self) -> DeliveryStatus {
        DeliveryStatus::parse(&self.status)
    }

    /// Failure reason, falling back to the status text for failed rows
    pub fn effective_failure_reason(&self) -> Option<String> {
        let reason = self
            .failure_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let status = self.delivery_status();
        match reason {
            Some(reason) => Some(reason),
            None if status.is_failure() => Some(status.as_str().to_string()),
            None => None,
        }
    }
}

/// Email bounce feed row (`email_failure_reports`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailFailure {
    pub id: i64,
    pub recipient_email: String,
    pub patron_barcode: Option<String>,
    pub failure_reason: Option<String>,
    pub error_code: Option<String>,
    pub received_at: NaiveDateTime,
}

/// Rollup row keyed by (summary_date, notification_type_id, delivery_option_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailySummary {
    pub summary_date: NaiveDate,
    pub notification_type_id: i64,
    pub delivery_option_id: i64,
    pub total_sent: i64,
    pub total_success: i64,
    pub total_failed: i64,
    pub total_pending: i64,
    pub total_holds: i64,
    pub total_overdues: i64,
    pub total_overdues_2nd: i64,
    pub total_overdues_3rd: i64,
    pub total_cancels: i64,
    pub total_recalls: i64,
    pub total_bills: i64,
    pub unique_patrons: i64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub aggregated_at: NaiveDateTime,
}

impl DailySummary {
    /// Aggregation key
    pub fn key(&self) -> (NaiveDate, i64, i64) {
        (
            self.summary_date,
            self.notification_type_id,
            self.delivery_option_id,
        )
    }
}

/// Column sums over a range of summary rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SummaryTotals {
    pub total_sent: i64,
    pub total_success: i64,
    pub total_failed: i64,
    pub total_pending: i64,
    pub total_holds: i64,
    pub total_overdues: i64,
    pub total_bills: i64,
}
