//! Wall-clock access shared by the queue and the store backends.

use chrono::Utc;

/// Current wall-clock time as whole UNIX seconds.
///
/// Eligibility deadlines and TTL expiries are all computed at one-second
/// granularity, so this is the only clock reading the crate ever takes.
pub(crate) fn now_unix_seconds() -> i64 {
    Utc::now().timestamp()
}
