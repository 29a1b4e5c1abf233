//! Virtual time for the discrete-event kernel.
//!
//! Time is a logical quantity with nanosecond resolution and no relation
//! to `std::time`. It advances only when the simulator dispatches an
//! event (or reaches a configured stop deadline).

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

// ── VirtualTime ───────────────────────────────────────────────────────

/// An absolute point on the simulation clock, in nanoseconds since the
/// simulation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The latest representable instant.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    /// Create a `VirtualTime` from raw nanoseconds.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        VirtualTime(micros.saturating_mul(NANOS_PER_MICRO as u64))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis.saturating_mul(NANOS_PER_MILLI as u64))
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs.saturating_mul(NANOS_PER_SEC as u64))
    }

    /// Fractional seconds, rounded to the nearest nanosecond.
    /// Negative and NaN inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return VirtualTime::ZERO;
        }
        VirtualTime((secs * NANOS_PER_SEC as f64).round() as u64)
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Offset this instant by a signed delay.
    ///
    /// Returns `None` if the result would fall before zero or past
    /// [`VirtualTime::MAX`].
    #[inline]
    pub fn checked_add(self, delay: SimDuration) -> Option<VirtualTime> {
        if delay.0 >= 0 {
            self.0.checked_add(delay.0 as u64).map(VirtualTime)
        } else {
            self.0.checked_sub(delay.0.unsigned_abs()).map(VirtualTime)
        }
    }

    /// Signed distance from `earlier` to `self`.
    ///
    /// Saturates at the bounds of [`SimDuration`].
    pub fn since(self, earlier: VirtualTime) -> SimDuration {
        let diff = self.0 as i128 - earlier.0 as i128;
        SimDuration(diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{}.{:09}s", self.0 / NANOS_PER_SEC as u64, self.0 % NANOS_PER_SEC as u64)
    }
}

// ── SimDuration ───────────────────────────────────────────────────────

/// A signed span of virtual time in nanoseconds.
///
/// Delays are signed so that a negative delay can reach the scheduler
/// and be rejected there, instead of wrapping silently at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimDuration(i64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    #[inline]
    pub const fn nanos(nanos: i64) -> Self {
        SimDuration(nanos)
    }

    #[inline]
    pub const fn micros(micros: i64) -> Self {
        SimDuration(micros.saturating_mul(NANOS_PER_MICRO))
    }

    #[inline]
    pub const fn millis(millis: i64) -> Self {
        SimDuration(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub const fn secs(secs: i64) -> Self {
        SimDuration(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Fractional seconds, rounded to the nearest nanosecond.
    pub fn secs_f64(secs: f64) -> Self {
        SimDuration((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Raw signed nanosecond value.
    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::ops::Add for SimDuration {
    type Output = SimDuration;

    fn add(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Mul<i64> for SimDuration {
    type Output = SimDuration;

    fn mul(self, rhs: i64) -> SimDuration {
        SimDuration(self.0.saturating_mul(rhs))
    }
}

impl std::fmt::Display for SimDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:09}s", sign, abs / NANOS_PER_SEC as u64, abs % NANOS_PER_SEC as u64)
    }
}
