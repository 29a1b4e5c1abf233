//! Structured error types for the simulation kernel.
//!
//! Every scheduling-contract violation is reported synchronously as a
//! `SimError` from the call that caused it. Failures raised by event
//! callbacks are wrapped in `EventFailed` and abort the run loop.

use thiserror::Error;

use crate::event::EventId;
use crate::time::{SimDuration, VirtualTime};

/// Error type a fallible callback may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Error)]
pub enum SimError {
    // ── Scheduling errors ─────────────────────────────────

    /// A negative delay was passed to `schedule`.
    #[error("invalid delay {delay}: events cannot be scheduled into the past")]
    InvalidDelay { delay: SimDuration },

    /// An absolute time earlier than the current clock was requested.
    #[error("cannot schedule at {requested} when current time is {now}")]
    TimeInPast {
        requested: VirtualTime,
        now: VirtualTime,
    },

    /// `now + delay` does not fit on the virtual clock.
    #[error("virtual time overflow: {now} + {delay}")]
    TimeOverflow { now: VirtualTime, delay: SimDuration },

    // ── Lifecycle errors ──────────────────────────────────

    /// The simulator was destroyed; it accepts no further work.
    #[error("scheduler is not running: it has been destroyed")]
    SchedulerDestroyed,

    /// `run`, `step` or `reset` was called from inside a dispatched
    /// callback.
    #[error("{operation} called from inside a callback (event {current})")]
    ReentrantRun {
        operation: &'static str,
        current: EventId,
    },

    // ── Handle errors ─────────────────────────────────────

    /// The handle was not issued by this simulator instance.
    #[error("event handle {0} is unknown to this scheduler")]
    UnknownHandle(EventId),

    // ── Callback errors ───────────────────────────────────

    /// A dispatched callback returned an error; the run was aborted.
    #[error("event {id} at {at} failed: {source}")]
    EventFailed {
        id: EventId,
        at: VirtualTime,
        #[source]
        source: CallbackError,
    },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
