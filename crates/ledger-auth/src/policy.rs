//! Session validity rules.
//!
//! A session is valid when it carries a non-empty token and an expiry that is
//! still in the future. A missing expiry counts as expired.

use chrono::{DateTime, Utc};

use crate::Session;

/// True if `expiry` is absent or `now` is at or after it.
pub fn is_expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expiry {
        Some(expiry) => now >= expiry,
        None => true,
    }
}

/// True if a session is present, has a token and has not expired at `now`.
pub fn is_valid(session: Option<&Session>, now: DateTime<Utc>) -> bool {
    session.is_some_and(|s| !s.token.is_empty() && !is_expired(s.expiry, now))
}

/// [`is_valid`] against the current time.
pub fn is_valid_now(session: Option<&Session>) -> bool {
    is_valid(session, Utc::now())
}
