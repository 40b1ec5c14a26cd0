//! Database Retry Logic
//!
//! Exponential backoff for transient SQLite lock errors. The ceiling on total
//! wait comes from `db_lock_max_wait_ms` in the engine configuration.

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Retry a database operation with exponential backoff until max_wait_ms elapses.
///
/// Only lock contention is retried; every other error is returned on the
/// first attempt. Backoff starts at 10ms, doubles, and is capped at 1000ms.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(
                operation = operation_name,
                attempt,
                "Retrying database operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_lock_contention() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();

                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}
