//! Wall-clock readings for marker files, temp names, and credential expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    // A clock set before 1970 reads as the epoch.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

pub fn now_unix() -> u64 {
    since_epoch().as_secs()
}

pub fn now_unix_millis() -> u64 {
    u64::try_from(since_epoch().as_millis()).unwrap_or(u64::MAX)
}

/// True once `expires_unix` has been reached. A credential without an expiry never lapses.
pub fn has_lapsed(expires_unix: Option<u64>, now_unix: u64) -> bool {
    expires_unix.is_some_and(|expiry| now_unix >= expiry)
}
