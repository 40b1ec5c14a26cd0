//! Verification engine against a real database

mod helpers;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use helpers::*;
use notices_common::config::EngineConfig;
use notices_common::db::{
    Delivery, EmailFailure, NotificationRecord, PhoneNotice, Submission,
};
use notices_common::time::FixedClock;
use notices_verify::lookups::patron_name;
use notices_verify::{
    EventKind, EvidenceFeeds, OverallStatus, SqliteStore, VerificationEngine, VerifierRegistry,
    VerifyError,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const BARCODE: &str = "12345";
const PHONE: &str = "5550100";

fn sms_hold(id: i64, when: NaiveDateTime) -> NotificationRecord {
    let mut record = NotificationRecord::new(id, BARCODE, 2, 8, when);
    record.phone = Some(PHONE.to_string());
    record.holds_count = 1;
    record
}

#[tokio::test]
async fn test_sms_hold_fully_confirmed() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds_20250501.txt").await;
    insert_phone_notice(&db.pool, BARCODE, Some(("Ada", "Lovelace")), PHONE, None, at(1, 9, 5)).await;
    insert_delivery(&db.pool, PHONE, at(1, 9, 30), "Delivered", None).await;

    let engine = verification_engine(&db, at(3, 0, 0));
    let result = engine.verify(&record).await;

    assert_eq!(result.overall_status, OverallStatus::Success);
    assert!(result.submitted && result.verified && result.delivered);
    assert_eq!(result.submission_file.as_deref(), Some("holds_20250501.txt"));
    assert_eq!(result.verification_file.as_deref(), Some("PhoneNotices.csv"));
    assert_eq!(result.delivery_status.as_deref(), Some("Delivered"));
    assert_eq!(result.failure_reason, None);

    let kinds: Vec<EventKind> = result.timeline().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Submitted, EventKind::Verified, EventKind::Delivered]
    );
    assert!(result
        .timeline()
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_failed_delivery_reports_reason() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds.txt").await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, None, at(1, 9, 5)).await;
    insert_delivery(&db.pool, PHONE, at(1, 9, 30), "Failed", Some("Number disconnected")).await;

    let result = verification_engine(&db, at(3, 0, 0)).verify(&record).await;

    assert_eq!(result.overall_status, OverallStatus::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("Number disconnected"));
    assert_eq!(
        result.status_message(),
        "Notice delivery failed: Number disconnected"
    );
}

#[tokio::test]
async fn test_grace_period_boundary() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds.txt").await;

    let before = verification_engine(&db, at(2, 8, 59)).verify(&record).await;
    assert_eq!(before.overall_status, OverallStatus::Pending);

    let after = verification_engine(&db, at(2, 9, 1)).verify(&record).await;
    assert_eq!(after.overall_status, OverallStatus::Failed);
    assert_eq!(after.failure_reason, None);
}

#[tokio::test]
async fn test_verified_awaiting_delivery_is_partial() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds.txt").await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, None, at(1, 9, 5)).await;
    // Pending report rows are not an outcome
    insert_delivery(&db.pool, PHONE, at(1, 9, 30), "Pending", None).await;

    let result = verification_engine(&db, at(5, 0, 0)).verify(&record).await;

    assert_eq!(result.overall_status, OverallStatus::Partial);
    assert!(!result.delivered);
}

#[tokio::test]
async fn test_delivery_window_and_earliest_match() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(2, 9, 0));
    insert_record(&db.pool, &record).await;
    // Three hours before the record: outside the window
    insert_delivery(&db.pool, PHONE, at(2, 6, 0), "Failed", Some("Too early")).await;
    insert_delivery(&db.pool, PHONE, at(2, 14, 0), "Failed", Some("Second attempt")).await;
    insert_delivery(&db.pool, PHONE, at(2, 8, 0), "Delivered", None).await;
    // Beyond 24 hours after
    insert_delivery(&db.pool, PHONE, at(3, 9, 1), "Failed", Some("Too late")).await;

    let result = verification_engine(&db, at(5, 0, 0)).verify(&record).await;

    assert_eq!(result.delivered_at, Some(at(2, 8, 0)));
    assert_eq!(result.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn test_delivery_window_edges_are_inclusive() {
    let db = create_test_db().await;
    let early = sms_hold(1, at(2, 9, 0));
    let mut late = sms_hold(2, at(2, 9, 0));
    late.phone = Some("5550199".to_string());
    insert_record(&db.pool, &early).await;
    insert_record(&db.pool, &late).await;
    // Exactly two hours before, and exactly 24 hours after
    insert_delivery(&db.pool, PHONE, at(2, 7, 0), "Delivered", None).await;
    insert_delivery(&db.pool, "5550199", at(3, 9, 0), "Delivered", None).await;

    let engine = verification_engine(&db, at(5, 0, 0));

    let result = engine.verify(&early).await;
    assert_eq!(result.delivered_at, Some(at(2, 7, 0)));

    let result = engine.verify(&late).await;
    assert_eq!(result.delivered_at, Some(at(3, 9, 0)));
}

#[tokio::test]
async fn test_unsubmitted_type_skips_submission_join() {
    let db = create_test_db().await;
    // Almost Overdue (7) never goes to the provider's submission files
    let mut record = sms_hold(1, at(1, 9, 0));
    record.notification_type_id = 7;
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds.txt").await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, None, at(1, 9, 5)).await;

    let result = verification_engine(&db, at(5, 0, 0)).verify(&record).await;

    assert!(!result.submitted);
    assert!(result.verified);
    assert_eq!(result.overall_status, OverallStatus::Partial);
}

#[tokio::test]
async fn test_item_barcode_narrows_verification() {
    let db = create_test_db().await;
    let mut record = sms_hold(1, at(1, 9, 0));
    record.item_barcode = Some("ITEM-2".to_string());
    insert_record(&db.pool, &record).await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, Some("ITEM-1"), at(1, 9, 5)).await;

    let unmatched = verification_engine(&db, at(1, 12, 0)).verify(&record).await;
    assert!(!unmatched.verified);

    insert_phone_notice(&db.pool, BARCODE, None, PHONE, Some("ITEM-2"), at(1, 9, 6)).await;
    let matched = verification_engine(&db, at(1, 12, 0)).verify(&record).await;
    assert_eq!(matched.verified_at, Some(at(1, 9, 6)));
}

#[tokio::test]
async fn test_email_channel() {
    let db = create_test_db().await;
    let engine = verification_engine(&db, at(5, 0, 0));

    let mut completed = NotificationRecord::new(1, BARCODE, 2, 2, at(1, 9, 0));
    completed.email = Some("ada@example.org".to_string());
    completed.notification_status_id = 12;
    let result = engine.verify(&completed).await;
    assert_eq!(result.overall_status, OverallStatus::Success);
    assert!(result.verified && !result.delivered);

    let mut polaris_failed = completed.clone();
    polaris_failed.id = 2;
    polaris_failed.email = Some("grace@example.org".to_string());
    polaris_failed.notification_status_id = 14;
    let result = engine.verify(&polaris_failed).await;
    assert_eq!(result.overall_status, OverallStatus::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("Email Failed"));

    insert_email_failure(&db.pool, "ADA@example.org", at(1, 9, 10), Some("Mailbox full")).await;
    let result = engine.verify(&completed).await;
    assert_eq!(result.overall_status, OverallStatus::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("Mailbox full"));
}

#[tokio::test]
async fn test_mail_channel() {
    let db = create_test_db().await;
    let engine = verification_engine(&db, at(5, 0, 0));

    let mut printed = NotificationRecord::new(1, BARCODE, 1, 1, at(1, 9, 0));
    printed.notification_status_id = 15;
    assert_eq!(engine.verify(&printed).await.overall_status, OverallStatus::Success);

    printed.notification_status_id = 0;
    assert_eq!(engine.verify(&printed).await.overall_status, OverallStatus::Pending);
}

#[tokio::test]
async fn test_unregistered_channel_is_pending() {
    let db = create_test_db().await;
    let record = NotificationRecord::new(1, BARCODE, 2, 6, at(1, 9, 0));

    let result = verification_engine(&db, at(5, 0, 0)).verify(&record).await;

    assert_eq!(result.overall_status, OverallStatus::Pending);
    assert!(result.timeline().is_empty());
}

#[tokio::test]
async fn test_verification_is_deterministic() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "a.txt").await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "b.txt").await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, None, at(1, 9, 5)).await;

    let engine = verification_engine(&db, at(1, 12, 0));
    let first = engine.verify(&record).await;
    let second = engine.verify(&record).await;

    assert_eq!(first, second);
    assert_eq!(first.submission_file.as_deref(), Some("a.txt"));
}

#[tokio::test]
async fn test_verify_by_id() {
    let db = create_test_db().await;
    insert_record(&db.pool, &sms_hold(42, at(1, 9, 0))).await;
    let engine = verification_engine(&db, at(1, 12, 0));

    let found = engine.verify_by_id(42).await.unwrap().unwrap();
    assert_eq!(found.record.id, 42);
    assert_eq!(found.result.record_id, 42);
    assert!(engine.verify_by_id(43).await.unwrap().is_none());
}

#[tokio::test]
async fn test_verify_for_patron_covers_every_record() {
    let db = create_test_db().await;
    insert_record(&db.pool, &sms_hold(1, at(1, 9, 0))).await;
    insert_record(&db.pool, &sms_hold(2, at(2, 9, 0))).await;
    insert_record(&db.pool, &sms_hold(3, at(2, 9, 0))).await;
    insert_record(&db.pool, &NotificationRecord::new(4, "99999", 2, 8, at(2, 9, 0))).await;

    let engine = verification_engine(&db, at(5, 0, 0));
    let cancel = CancellationToken::new();

    let all = engine
        .verify_for_patron(BARCODE, None, None, &cancel)
        .await
        .unwrap();
    let ids: Vec<i64> = all.iter().map(|n| n.record.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(all.iter().all(|n| n.result.record_id == n.record.id));

    let one_day = engine
        .verify_for_patron(BARCODE, Some(day(1)), None, &cancel)
        .await
        .unwrap();
    assert_eq!(one_day.len(), 1);

    let range = engine
        .verify_for_patron(BARCODE, Some(day(1)), Some(day(2)), &cancel)
        .await
        .unwrap();
    assert_eq!(range.len(), 3);
}

#[tokio::test]
async fn test_verify_for_patron_rejects_reversed_range() {
    let db = create_test_db().await;
    let engine = verification_engine(&db, at(5, 0, 0));

    let err = engine
        .verify_for_patron(BARCODE, Some(day(3)), Some(day(1)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::InvalidRange { .. }));
}

#[tokio::test]
async fn test_cancelled_patron_query() {
    let db = create_test_db().await;
    insert_record(&db.pool, &sms_hold(1, at(1, 9, 0))).await;
    let engine = verification_engine(&db, at(5, 0, 0));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .verify_for_patron(BARCODE, None, None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Cancelled));
}

/// Feeds that fail on delivery reports and pass everything else through
struct BrokenDeliveries(Arc<SqliteStore>);

#[async_trait]
impl EvidenceFeeds for BrokenDeliveries {
    async fn submissions_on(
        &self,
        patron_barcode: &str,
        submission_type: &str,
        day: NaiveDate,
    ) -> notices_common::Result<Vec<Submission>> {
        self.0.submissions_on(patron_barcode, submission_type, day).await
    }

    async fn phone_notices_on(
        &self,
        patron_barcode: &str,
        day: NaiveDate,
        item_barcode: Option<&str>,
    ) -> notices_common::Result<Vec<PhoneNotice>> {
        self.0.phone_notices_on(patron_barcode, day, item_barcode).await
    }

    async fn phone_notices_between(
        &self,
        patron_barcode: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> notices_common::Result<Vec<PhoneNotice>> {
        self.0.phone_notices_between(patron_barcode, start, end).await
    }

    async fn deliveries_between(
        &self,
        _phone_number: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> notices_common::Result<Vec<Delivery>> {
        Err(notices_common::Error::Internal("delivery report table unavailable".to_string()))
    }

    async fn email_failures_between(
        &self,
        recipient_email: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> notices_common::Result<Vec<EmailFailure>> {
        self.0.email_failures_between(recipient_email, start, end).await
    }
}

#[tokio::test]
async fn test_feed_failure_keeps_partial_evidence() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    insert_record(&db.pool, &record).await;
    insert_submission(&db.pool, BARCODE, "holds", PHONE, at(1, 8, 0), "holds.txt").await;
    insert_phone_notice(&db.pool, BARCODE, None, PHONE, None, at(1, 9, 5)).await;

    let config = EngineConfig::default();
    let registry = VerifierRegistry::from_config(&config).unwrap();
    let engine = VerificationEngine::new(
        db.store.clone(),
        Arc::new(BrokenDeliveries(db.store.clone())),
        registry,
        config,
    )
    .with_clock(Arc::new(FixedClock(at(9, 0, 0))));

    let result = engine.verify(&record).await;

    assert!(result.submitted && result.verified);
    assert!(result.is_incomplete());
    assert_eq!(result.overall_status, OverallStatus::Pending);
    let note = result
        .timeline()
        .iter()
        .find(|e| e.kind == EventKind::FeedError)
        .unwrap();
    assert_eq!(note.source, "shoutbomb_deliveries");
}

#[tokio::test]
async fn test_patron_name_lookup() {
    let db = create_test_db().await;
    let record = sms_hold(1, at(1, 9, 0));
    let window = EngineConfig::default().patron_name_window();

    assert_eq!(patron_name(&record, db.store.as_ref(), window).await, BARCODE);

    // Same day, outside the window
    insert_phone_notice(&db.pool, BARCODE, Some(("Ada", "King")), PHONE, None, at(1, 18, 0)).await;
    assert_eq!(patron_name(&record, db.store.as_ref(), window).await, "King, Ada");

    insert_phone_notice(&db.pool, BARCODE, Some(("Ada", "Lovelace")), PHONE, None, at(1, 9, 30)).await;
    assert_eq!(patron_name(&record, db.store.as_ref(), window).await, "Lovelace, Ada");

    let anonymous = NotificationRecord::new(2, "", 2, 8, at(1, 9, 0));
    assert_eq!(
        patron_name(&anonymous, db.store.as_ref(), window).await,
        "Unknown Patron"
    );
}
