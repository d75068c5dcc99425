//! Lamport logical clock.
//!
//! A [`LogicalClock`] is owned by exactly one node's event engine and is
//! never shared, so it is a plain value type with no interior mutability.
//!
//! Update rules:
//! - local event or send:  `clock = clock + 1`
//! - receipt of `v`:       `clock = max(v, clock) + 1`

/// Value every node's clock holds before its first tick.
pub const INITIAL_CLOCK: u32 = 1;

/// A single node's logical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogicalClock(u32);

impl LogicalClock {
    /// Create a clock holding `value`.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Current clock value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Advance by one for a tick that processed no message.
    pub fn tick(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    /// Merge a received timestamp: `max(received, current) + 1`.
    pub fn observe(&mut self, received: u32) -> u32 {
        self.0 = received.max(self.0).saturating_add(1);
        self.0
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self(INITIAL_CLOCK)
    }
}

impl std::fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
