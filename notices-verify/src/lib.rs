//! notices-verify library
//!
//! Reconciles the canonical notification log against per-channel evidence
//! feeds (submission files, Polaris phone-notice exports, provider delivery
//! reports, email bounces) and rolls per-notice outcomes into daily summaries.

pub mod aggregation;
pub mod engine;
pub mod error;
pub mod lookups;
pub mod result;
pub mod store;
pub mod verifier;

pub use crate::aggregation::{AggregationEngine, AggregationIssue, AggregationManifest};
pub use crate::engine::{VerificationEngine, VerifiedNotice};
pub use crate::error::{VerifyError, VerifyResult};
pub use crate::result::{EventKind, OverallStatus, TimelineEvent, VerificationResult};
pub use crate::store::{EvidenceFeeds, NotificationStore, SqliteStore, SummaryStore};
pub use crate::verifier::{ChannelVerifier, VerifierRegistry};
