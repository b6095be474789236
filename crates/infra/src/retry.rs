//! Re-run a read-plan-commit cycle when a version guard trips.

use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Run `attempt` until it succeeds, fails with a non-concurrency error, or has been
/// retried `max_retries` times after a conflict.
///
/// Every attempt must re-read its inputs; a retry never reuses a stale plan.
pub fn retry_on_conflict<T, F>(operation: &'static str, max_retries: u32, mut attempt: F) -> LedgerResult<T>
where
    F: FnMut() -> LedgerResult<T>,
{
    let mut retries = 0;
    loop {
        match attempt() {
            Err(LedgerError::Concurrency(msg)) if retries < max_retries => {
                retries += 1;
                debug!(operation, retry = retries, reason = %msg, "version conflict, retrying");
            }
            Err(LedgerError::Concurrency(msg)) => {
                warn!(operation, retries, "giving up after repeated version conflicts");
                return Err(LedgerError::Concurrency(msg));
            }
            other => return other,
        }
    }
}
