//! Error types for notices-verify
//!
//! Only `InvalidRange`, `Cancelled`, `DuplicateVerifier`, `UnknownVerifier`
//! and `Common` ever reach a caller. The rest describe per-record or
//! per-combination conditions that are logged and folded into results.

use chrono::NaiveDate;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum VerifyError {
    /// No verifier registered for the record's delivery option
    #[error("No verifier registered for delivery option {channel}")]
    MissingVerifier { channel: i64 },

    /// An evidence feed could not be read
    #[error("Evidence feed '{feed}' unavailable: {source}")]
    FeedUnavailable {
        feed: &'static str,
        #[source]
        source: notices_common::Error,
    },

    /// More than one equally valid evidence row; the earliest one was used
    #[error("Ambiguous match in '{feed}' for record {record_id}: {candidates} candidates")]
    AmbiguousMatch {
        feed: &'static str,
        record_id: i64,
        candidates: usize,
    },

    /// Upsert of one summary combination failed
    #[error("Summary write failed for {date} type {notification_type} channel {channel}: {message}")]
    AggregationWrite {
        date: NaiveDate,
        notification_type: i64,
        channel: i64,
        message: String,
    },

    /// Caller abandoned the request
    #[error("Operation cancelled")]
    Cancelled,

    /// Start date after end date
    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    /// Two verifiers registered under one name
    #[error("Verifier '{0}' is already registered")]
    DuplicateVerifier(String),

    /// Channel table names a verifier that does not exist
    #[error("Unknown verifier '{0}' in channel table")]
    UnknownVerifier(String),

    /// Store or configuration error
    #[error(transparent)]
    Common(#[from] notices_common::Error),
}

impl VerifyError {
    pub fn feed(feed: &'static str, source: notices_common::Error) -> Self {
        VerifyError::FeedUnavailable { feed, source }
    }
}

/// Result type for engine operations
pub type VerifyResult<T> = Result<T, VerifyError>;
