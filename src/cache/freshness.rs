//! Freshness policy: pure TTL comparison

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether an entry stored at `stored_at` is past its freshness window at `now`.
///
/// The comparison is strict: an entry exactly `ttl` old is still fresh.
/// `None` means the class has no window and nothing ever expires. Entries
/// stored "in the future" (clock skew) are treated as fresh.
pub fn is_expired(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
    let Some(ttl) = ttl else {
        return false;
    };

    match (now - stored_at).to_std() {
        Ok(age) => age > ttl,
        Err(_) => false,
    }
}
