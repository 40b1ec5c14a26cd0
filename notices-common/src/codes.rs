//! Polaris code tables
//!
//! Notification type, delivery option and notification status codes arrive as
//! small integers on every notification record. The tables here give them
//! names and classify them for verification and aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery option code: printed mail
pub const DELIVERY_MAIL: i64 = 1;
/// Delivery option code: email
pub const DELIVERY_EMAIL: i64 = 2;
/// Delivery option code: voice call (PhoneVoice1)
pub const DELIVERY_VOICE: i64 = 3;
/// Delivery option code: SMS text (same phone field as voice)
pub const DELIVERY_SMS: i64 = 8;

/// Notification type code: Hold Ready
pub const TYPE_HOLD: i64 = 2;
/// Notification type code: 1st Overdue
pub const TYPE_OVERDUE: i64 = 1;
/// Notification type code: 2nd Overdue
pub const TYPE_OVERDUE_2ND: i64 = 12;
/// Notification type code: 3rd Overdue
pub const TYPE_OVERDUE_3RD: i64 = 13;

/// Polaris status code: Email Completed
pub const STATUS_EMAIL_COMPLETED: i64 = 12;
/// Polaris status code: Email Failed - Invalid address
pub const STATUS_EMAIL_INVALID: i64 = 13;
/// Polaris status code: Email Failed
pub const STATUS_EMAIL_FAILED: i64 = 14;
/// Polaris status code: Mail Printed
pub const STATUS_MAIL_PRINTED: i64 = 15;

/// Human-readable notification type name
pub fn notification_type_name(code: i64) -> String {
    let name = match code {
        0 => "Combined",
        1 => "1st Overdue",
        2 => "Hold Ready",
        3 => "Hold Cancel",
        4 => "Recall",
        5 => "All",
        6 => "Route",
        7 => "Almost Overdue",
        8 => "Fine Notice",
        9 => "Inactive Reminder",
        10 => "Expiration Reminder",
        11 => "Bill",
        12 => "2nd Overdue",
        13 => "3rd Overdue",
        14 => "Serial Claim",
        15 => "Polaris Fusion",
        16 => "Course Reserves",
        17 => "Borrow-By-Mail Failure",
        18 => "2nd Hold",
        19 => "Missing Part",
        20 => "Manual Bill",
        21 => "2nd Fine Notice",
        other => return format!("Unknown ({})", other),
    };
    name.to_string()
}

/// Human-readable delivery option name
pub fn delivery_option_name(code: i64) -> String {
    let name = match code {
        1 => "Mail",
        2 => "Email",
        3 => "Voice",
        4 => "Phone 2 (Voice)",
        5 => "Phone 3 (Voice)",
        6 => "FAX",
        7 => "EDI",
        8 => "SMS",
        9 => "Mobile App",
        other => return format!("Unknown ({})", other),
    };
    name.to_string()
}

/// Human-readable Polaris notification status name
pub fn notification_status_name(code: i64) -> Option<&'static str> {
    Some(match code {
        1 => "Call completed - Voice",
        2 => "Call completed - Answering machine",
        3 => "Call not completed - Hang up",
        4 => "Call not completed - Busy",
        5 => "Call not completed - No answer",
        6 => "Call not completed - No ring",
        7 => "Call failed - No dial tone",
        8 => "Call failed - Intercept tones heard",
        9 => "Call failed - Probable bad phone number",
        10 => "Call failed - Maximum retries exceeded",
        11 => "Call failed - Undetermined error",
        12 => "Email Completed",
        13 => "Email Failed - Invalid address",
        14 => "Email Failed",
        15 => "Mail Printed",
        16 => "Sent",
        _ => return None,
    })
}

/// Map a notification type to the type label used in submission files
///
/// Returns `None` for types that are never submitted to the phone provider.
pub fn submission_type_for(notification_type_id: i64) -> Option<&'static str> {
    match notification_type_id {
        TYPE_HOLD => Some("holds"),
        TYPE_OVERDUE | TYPE_OVERDUE_2ND | TYPE_OVERDUE_3RD => Some("overdue"),
        _ => None,
    }
}

/// Per-notice outcome used by the daily rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Pending,
}

impl Outcome {
    /// Classify a Polaris notification status code
    pub fn from_polaris_status(code: i64) -> Self {
        match code {
            1 | 2 | 12 | 15 | 16 => Outcome::Success,
            3..=11 | 13 | 14 => Outcome::Failed,
            _ => Outcome::Pending,
        }
    }
}

/// Status column of the delivery-status feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Pending,
    Invalid,
    OptedOut,
}

impl DeliveryStatus {
    /// Parse the stored status text; unknown values are treated as failures
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "delivered" => DeliveryStatus::Delivered,
            "pending" => DeliveryStatus::Pending,
            "invalid" => DeliveryStatus::Invalid,
            "optedout" | "opted_out" | "opted-out" => DeliveryStatus::OptedOut,
            _ => DeliveryStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Invalid => "Invalid",
            DeliveryStatus::OptedOut => "OptedOut",
        }
    }

    /// True for statuses that report a terminal failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Failed | DeliveryStatus::Invalid | DeliveryStatus::OptedOut
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_type_mapping() {
        assert_eq!(submission_type_for(TYPE_HOLD), Some("holds"));
        assert_eq!(submission_type_for(TYPE_OVERDUE), Some("overdue"));
        assert_eq!(submission_type_for(TYPE_OVERDUE_2ND), Some("overdue"));
        assert_eq!(submission_type_for(TYPE_OVERDUE_3RD), Some("overdue"));
        assert_eq!(submission_type_for(7), None);
    }

    #[test]
    fn test_polaris_status_classification() {
        for code in [1, 2, 12, 15, 16] {
            assert_eq!(Outcome::from_polaris_status(code), Outcome::Success);
        }
        for code in [3, 9, 11, 13, 14] {
            assert_eq!(Outcome::from_polaris_status(code), Outcome::Failed);
        }
        assert_eq!(Outcome::from_polaris_status(0), Outcome::Pending);
        assert_eq!(Outcome::from_polaris_status(99), Outcome::Pending);
    }

    #[test]
    fn test_delivery_status_parse() {
        assert_eq!(DeliveryStatus::parse("Delivered"), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::parse("OptedOut"), DeliveryStatus::OptedOut);
        assert_eq!(DeliveryStatus::parse(" invalid "), DeliveryStatus::Invalid);
        assert_eq!(DeliveryStatus::parse("bounced"), DeliveryStatus::Failed);
        assert!(!DeliveryStatus::Pending.is_failure());
        assert!(DeliveryStatus::Invalid.is_failure());
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(notification_type_name(2), "Hold Ready");
        assert_eq!(notification_type_name(42), "Unknown (42)");
        assert_eq!(delivery_option_name(8), "SMS");
        assert!(notification_status_name(99).is_none());
    }
}
