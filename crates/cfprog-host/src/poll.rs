//! Status polling policies

use std::time::Duration;

/// How to wait for a device-side operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep before the first status query
    pub initial_delay: Duration,
    /// Sleep between status queries
    pub interval: Duration,
    /// Give up after this many queries
    pub max_polls: u32,
}

impl PollPolicy {
    /// Policy for one 64-byte program
    pub const WRITE: Self = Self {
        initial_delay: Duration::from_millis(1),
        interval: Duration::from_micros(100),
        max_polls: 1000,
    };

    /// Policy for one 64-byte read
    pub const READ: Self = Self {
        initial_delay: Duration::from_micros(50),
        interval: Duration::from_micros(20),
        max_polls: 1000,
    };

    /// Policy for an ID or sector protection query
    pub const QUERY: Self = Self {
        initial_delay: Duration::from_millis(50),
        interval: Duration::from_millis(10),
        max_polls: 20,
    };

    /// Policy for a chip or sector erase
    ///
    /// The device gives up after about ten seconds; this covers that with
    /// margin.
    pub const ERASE: Self = Self {
        initial_delay: Duration::from_secs(1),
        interval: Duration::from_millis(500),
        max_polls: 60,
    };

    /// Longest time this policy waits before giving up
    pub fn budget(&self) -> Duration {
        self.initial_delay + self.interval * self.max_polls.saturating_sub(1)
    }
}

/// Timing configuration of a [`crate::Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Waiting for bulk writes
    pub write: PollPolicy,
    /// Waiting for bulk reads
    pub read: PollPolicy,
    /// Waiting for erases
    pub erase: PollPolicy,
    /// Pause after priming the bus for reads or writes
    pub setup_delay: Duration,
    /// Waiting for ID and protection queries
    pub query: PollPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write: PollPolicy::WRITE,
            read: PollPolicy::READ,
            erase: PollPolicy::ERASE,
            setup_delay: Duration::from_micros(500),
            query: PollPolicy::QUERY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_budget_exceeds_device_timeout() {
        // 50 ms start delay plus 100 checks 100 ms apart on the device
        assert!(PollPolicy::ERASE.budget() > Duration::from_millis(50 + 100 * 100));
    }

    #[test]
    fn test_write_budget() {
        assert_eq!(
            PollPolicy::WRITE.budget(),
            Duration::from_millis(1) + Duration::from_micros(100) * 999
        );
    }
}
