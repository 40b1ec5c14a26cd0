//! Test Helper Utilities
//!
//! Shared utilities for testing notices-verify

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{
    at, create_test_db, day, insert_delivery, insert_email_failure, insert_phone_notice,
    insert_record, insert_submission, verification_engine, TestDb,
};
