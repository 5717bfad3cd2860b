//! Time source for default-value stamping and event timestamps.

use chrono::{DateTime, Utc};

/// Source of the current UTC instant.
///
/// Mutation paths take a `Clock` instead of calling `Utc::now()` directly so
/// tests can pin time and assert exact `ts` and `now()`-constraint values.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock source used outside tests.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
