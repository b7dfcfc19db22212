use std::time::Duration;

use crate::config::PollingSettings;

/// Two-level poll interval: short right after user activity, long once
/// enough polls have gone by without any
#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    short: Duration,
    long: Duration,
    count_for_long: u32,
    consecutive_polls: u32,
    current: Duration,
}

impl AdaptiveInterval {
    /// Create a new adaptive interval, starting at the short value
    ///
    /// # Arguments
    /// * `short` - Delay used while activity is recent
    /// * `long` - Delay used at steady state
    /// * `count_for_long` - Polls since the last action before switching to `long`
    pub fn new(short: Duration, long: Duration, count_for_long: u32) -> Self {
        Self {
            short,
            long,
            count_for_long,
            consecutive_polls: 0,
            current: short,
        }
    }

    pub fn from_settings(settings: &PollingSettings) -> Self {
        Self::new(
            settings.short_interval(),
            settings.long_interval(),
            settings.count_for_long,
        )
    }

    /// Count a completed poll and pick the interval for the next one
    pub fn record_poll(&mut self) {
        self.consecutive_polls = self.consecutive_polls.saturating_add(1);

        self.current = if self.consecutive_polls >= self.count_for_long {
            self.long
        } else {
            self.short
        };
    }

    /// User activity: poll quickly again
    pub fn reset(&mut self) {
        self.consecutive_polls = 0;
        self.current = self.short;
    }

    /// Retry soon without touching the poll count
    pub fn force_short(&mut self) {
        self.current = self.short;
    }

    /// Back off without touching the poll count
    pub fn force_long(&mut self) {
        self.current = self.long;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn consecutive_polls(&self) -> u32 {
        self.consecutive_polls
    }
}
