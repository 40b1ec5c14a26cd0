//! # Notices Common Library
//!
//! Shared code for the notice verification workspace:
//! - Database schema and row models
//! - Code tables (notification types, delivery options, Polaris statuses)
//! - Configuration loading
//! - Time and retry utilities

pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod retry;
pub mod time;

pub use codes::{DeliveryStatus, Outcome};
pub use error::{Error, Result};
