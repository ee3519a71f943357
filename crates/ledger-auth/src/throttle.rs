//! Client-side login attempt counter.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{Error, Result};

#[derive(Debug, Default)]
struct Attempts {
    failures: u32,
    last_failure: Option<DateTime<Utc>>,
}

/// Counts rejected logins and blocks submission at a fixed ceiling.
///
/// Once `max_attempts` rejections have been recorded, [`LoginThrottle::check`]
/// fails until `cooldown` has passed since the last rejection. A successful
/// login resets the counter.
#[derive(Debug)]
pub struct LoginThrottle {
    max_attempts: u32,
    cooldown: TimeDelta,
    state: Mutex<Attempts>,
}

impl LoginThrottle {
    /// New throttle with the given ceiling and cooldown.
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts,
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            state: Mutex::new(Attempts::default()),
        }
    }

    /// Fail with [`Error::RateLimited`] if submissions are currently blocked.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        let Ok(mut state) = self.state.lock() else {
            return Err(Error::RateLimited);
        };
        if state.failures < self.max_attempts {
            return Ok(());
        }
        let cooled = state
            .last_failure
            .is_none_or(|last| {
                last.checked_add_signed(self.cooldown)
                    .is_some_and(|until| now >= until)
            });
        if cooled {
            *state = Attempts::default();
            Ok(())
        } else {
            Err(Error::RateLimited)
        }
    }

    /// Record a rejected login.
    pub fn record_failure(&self, now: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            state.failures = state.failures.saturating_add(1);
            state.last_failure = Some(now);
        }
    }

    /// Forget all recorded failures.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = Attempts::default();
        }
    }

    /// Rejections recorded since the last reset.
    pub fn attempts(&self) -> u32 {
        self.state.lock().map(|s| s.failures).unwrap_or(0)
    }

    /// Ceiling after which submissions are blocked.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
