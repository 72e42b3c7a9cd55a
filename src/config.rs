//! Engine timing configuration.

use crate::error::EngineError;
use std::time::Duration;

/// Default cadence of the reapplication timer.
pub const DEFAULT_REAPPLY_INTERVAL: Duration = Duration::from_secs(1);
/// Default wait after a reconfiguration ends before tables are pushed again.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
/// Default cap on idle waits when the backend's native events must be pumped.
pub const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing parameters for [`GammaEngine`](crate::GammaEngine).
///
/// The transform itself is fixed; only when it is reasserted can be tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How often the tables are re-pushed while active.
    pub reapply_interval: Duration,
    /// Delay between the end of a display reconfiguration and the reapplication.
    pub settle_delay: Duration,
    /// Longest idle wait when the backend needs [`dispatch_pending`](crate::DisplayBackend::dispatch_pending).
    pub event_poll_interval: Duration,
}

impl EngineConfig {
    /// Create a configuration with custom timings.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] if either duration is zero.
    pub fn new(reapply_interval: Duration, settle_delay: Duration) -> Result<Self, EngineError> {
        if reapply_interval.is_zero() {
            return Err(EngineError::InvalidConfig {
                field: "reapply_interval",
                reason: "must be greater than zero",
            });
        }
        if settle_delay.is_zero() {
            return Err(EngineError::InvalidConfig {
                field: "settle_delay",
                reason: "must be greater than zero",
            });
        }
        Ok(Self {
            reapply_interval,
            settle_delay,
            event_poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
        })
    }

    /// Override the event pump interval. Zero is replaced by the default.
    pub fn with_event_poll_interval(mut self, interval: Duration) -> Self {
        self.event_poll_interval = if interval.is_zero() {
            DEFAULT_EVENT_POLL_INTERVAL
        } else {
            interval
        };
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reapply_interval: DEFAULT_REAPPLY_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            event_poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
        }
    }
}
