//! Retry delays after failed syncs.

use std::time::Duration;

/// Delay before the next attempt, indexed by the failures seen so far.
pub const BACKOFF_LADDER: [Duration; 4] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(60 * 60),
];

/// Delay after a failure, given the consecutive failures before it.
///
/// Clamped to the last rung once the streak outgrows the ladder.
///
/// ```
/// use core_sync::backoff::backoff_delay;
/// use std::time::Duration;
///
/// assert_eq!(backoff_delay(0), Duration::from_secs(60));
/// assert_eq!(backoff_delay(10), Duration::from_secs(3600));
/// ```
pub fn backoff_delay(error_count: u32) -> Duration {
    let index = (error_count as usize).min(BACKOFF_LADDER.len() - 1);
    BACKOFF_LADDER[index]
}
