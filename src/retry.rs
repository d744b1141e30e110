//! Single-retry policy for calls into the record store and embedding oracle.

use std::time::Duration;

use crate::error::Result;

/// Retries a transient failure once after a fixed backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `f`, retrying transient errors until attempts are exhausted.
    ///
    /// Non-transient errors return immediately. The last transient error is
    /// surfaced unchanged so callers see `StoreUnavailable`/`OracleUnavailable`.
    pub fn run<T>(&self, what: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    tracing::warn!(op = what, attempt, error = %e, "transient failure, retrying");
                    std::thread::sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(op = what, attempts = attempt, error = %e, "giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}
