//! Simulator configuration.

use crate::time::VirtualTime;

/// Construction-time settings for a [`Simulator`](crate::Simulator).
///
/// # Example
/// ```rust
/// use chronon::{Simulator, SimulatorConfig, VirtualTime};
///
/// let sim = Simulator::with_config(
///     SimulatorConfig::new()
///         .epoch(VirtualTime::from_secs(1))
///         .stop_at(VirtualTime::from_secs(10))
///         .record_trace(true),
/// );
/// assert_eq!(sim.now(), VirtualTime::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct SimulatorConfig {
    /// Initial value of the virtual clock.
    pub epoch: VirtualTime,
    /// Deadline installed at construction, as if `stop_at` had been called.
    pub stop_at: Option<VirtualTime>,
    /// Record every dispatch into a [`DispatchTrace`](crate::trace::DispatchTrace).
    pub record_trace: bool,
}

impl SimulatorConfig {
    pub fn new() -> Self {
        SimulatorConfig {
            epoch: VirtualTime::ZERO,
            stop_at: None,
            record_trace: false,
        }
    }

    pub fn epoch(mut self, epoch: VirtualTime) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn stop_at(mut self, at: VirtualTime) -> Self {
        self.stop_at = Some(at);
        self
    }

    pub fn record_trace(mut self, enabled: bool) -> Self {
        self.record_trace = enabled;
        self
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.epoch, VirtualTime::ZERO);
        assert_eq!(cfg.stop_at, None);
        assert!(!cfg.record_trace);
    }

    #[test]
    fn test_builder() {
        let cfg = SimulatorConfig::new()
            .epoch(VirtualTime::from_millis(5))
            .stop_at(VirtualTime::from_secs(2))
            .record_trace(true);
        assert_eq!(cfg.epoch, VirtualTime::from_millis(5));
        assert_eq!(cfg.stop_at, Some(VirtualTime::from_secs(2)));
        assert!(cfg.record_trace);
    }
}
