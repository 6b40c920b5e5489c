//! Retry helper for transient I/O contention
//!
//! Writes can fail transiently when another process or an on-access scanner
//! holds a file open. They are retried a fixed number of times with a fixed
//! pause; no exponential backoff and no cancellation mid-retry.

use crate::error::Result;
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Execute an operation with retry logic
///
/// # Errors
///
/// Returns the last error once the attempt budget is exhausted.
pub fn with_retry<T, F>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}",
                    attempt,
                    config.max_attempts,
                    e,
                    config.backoff
                );
                thread::sleep(config.backoff);
            }
        }
    }
}
