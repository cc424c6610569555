//! Coordinator connection state machine and reconnect policy.

use std::time::Duration;

use sentinel_common::ReconnectSettings;

/// Lifecycle of the coordinator event connection.
///
/// `Disconnected → Connecting → Authenticating → Connected → Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

/// Capped exponential backoff with an optional attempt bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn unbounded(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: None,
        }
    }

    #[must_use]
    pub fn bounded(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Delay after the `failures`-th consecutive failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub fn should_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }
}

impl From<ReconnectSettings> for ReconnectPolicy {
    fn from(settings: ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            max_attempts: settings.max_attempts,
        }
    }
}
