use chrono::{DateTime, Utc};
use tokio::time::Duration;

/// Delay after a failed fetch or publish. Fixed, no exponential backoff.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Lower bound for any sleep of the refresh loop, so a token that is already
/// inside its margin is re-fetched promptly without spinning.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// How long before expiry a refresh is attempted.
    pub margin: Duration,
    pub retry_interval: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            retry_interval: RETRY_INTERVAL,
        }
    }
}

impl RefreshPolicy {
    pub fn new(margin: Duration) -> Self {
        Self {
            margin,
            ..Self::default()
        }
    }

    /// Time until the next fetch after a successful publish:
    /// `expiry - now - margin`, floored at zero.
    ///
    /// A token without expiry is refreshed every `margin`.
    pub fn next_wake(&self, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let Some(expiry) = expiry else {
            return self.margin;
        };
        let remaining = match (expiry - now).to_std() {
            Ok(remaining) => remaining,
            Err(_) => return Duration::ZERO,
        };
        remaining.saturating_sub(self.margin)
    }

    /// Actual sleep for a computed wake delay.
    pub fn sleep_for(&self, wake: Duration) -> Duration {
        wake.max(MIN_REFRESH_DELAY)
    }
}
