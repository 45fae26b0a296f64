use std::time::Duration;

use anyhow::{Result, ensure};

/// Timing knobs for the lock protocol.
///
/// The defaults reproduce the reference behavior; callers may tune them as
/// long as the ordering invariant holds: the termination grace window must be
/// strictly shorter than the secondary staleness ceiling, or a process busy
/// escalating a kill could lose its own secondary lock mid-escalation.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Age past which an abandoned secondary lock may be broken by any waiter.
    pub secondary_stale: Duration,
    /// Sleep between acquisition attempts on either lock.
    pub retry_interval: Duration,
    /// How long a stale holder gets to exit after graceful termination.
    pub grace_period: Duration,
    /// Liveness poll interval during the grace window.
    pub grace_poll: Duration,
    /// Poll interval while supervising a child under a timeout.
    pub child_poll: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            secondary_stale: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            grace_poll: Duration::from_secs(1),
            child_poll: Duration::from_secs(5),
        }
    }
}

impl LockPolicy {
    /// Check the policy's internal consistency.
    ///
    /// # Errors
    /// Returns an error if the grace window is not strictly shorter than the
    /// secondary staleness ceiling, or if any poll interval is zero.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.grace_period < self.secondary_stale,
            "grace period ({:?}) must be shorter than the secondary staleness ceiling ({:?})",
            self.grace_period,
            self.secondary_stale
        );
        ensure!(
            !self.retry_interval.is_zero() && !self.grace_poll.is_zero() && !self.child_poll.is_zero(),
            "poll intervals must be non-zero"
        );
        Ok(self)
    }
}
