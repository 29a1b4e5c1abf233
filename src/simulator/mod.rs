//! Simulation execution loop.
//!
//! `Simulator` owns the pending set and the virtual clock. It pops
//! events in `(time, sequence)` order, advances the clock to each
//! event's time and invokes the event's callback with `&mut Simulator`,
//! so callbacks schedule, cancel and stop reentrantly through the same
//! API as outside code. The loop is synchronous and single-threaded.
//!
//! # Example
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use chronon::{SimDuration, Simulator, VirtualTime};
//!
//! let mut sim = Simulator::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = Rc::clone(&seen);
//! sim.schedule(SimDuration::secs(3), move |sim| {
//!     log.borrow_mut().push(sim.now());
//!     let log = Rc::clone(&log);
//!     sim.schedule(SimDuration::secs(2), move |sim| log.borrow_mut().push(sim.now()))
//!         .unwrap();
//! })
//! .unwrap();
//!
//! sim.run().unwrap();
//! assert_eq!(*seen.borrow(), vec![VirtualTime::from_secs(3), VirtualTime::from_secs(5)]);
//! ```

mod state;

pub use state::SchedulerState;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::config::SimulatorConfig;
use crate::error::{CallbackError, SimError, SimResult};
use crate::event::{Event, EventId, NO_CONTEXT};
use crate::scheduler::{CancelOutcome, Scheduler};
use crate::time::{SimDuration, VirtualTime};
use crate::trace::DispatchTrace;

/// Source of per-simulator instance tags carried inside every `EventId`.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

fn next_instance() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

type Action = Box<dyn FnOnce(&mut Simulator) -> Result<(), CallbackError>>;

fn infallible<F>(f: F) -> Action
where
    F: FnOnce(&mut Simulator) + 'static,
{
    Box::new(move |sim: &mut Simulator| -> Result<(), CallbackError> {
        f(sim);
        Ok(())
    })
}

// ── Simulator ─────────────────────────────────────────────────────────

/// A virtual-time discrete-event simulator.
///
/// Each value is an independent simulation; several may coexist in one
/// process. The type is `!Send`: callbacks capture shared client state
/// through `Rc<RefCell<_>>` and run on the thread that calls `run`.
pub struct Simulator {
    scheduler: Scheduler<Action>,
    state: SchedulerState,
    now: VirtualTime,
    epoch: VirtualTime,
    stop_at: Option<VirtualTime>,
    stop_requested: bool,
    /// Event being dispatched and its context.
    dispatching: Option<(EventId, u32)>,
    events_processed: u64,
    trace: Option<DispatchTrace>,
}

impl Simulator {
    /// Create a simulator with the clock at zero.
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    pub fn with_config(config: SimulatorConfig) -> Self {
        let mut sim = Simulator {
            scheduler: Scheduler::new(next_instance()),
            state: SchedulerState::Uninitialized,
            now: config.epoch,
            epoch: config.epoch,
            stop_at: None,
            stop_requested: false,
            dispatching: None,
            events_processed: 0,
            trace: config.record_trace.then(DispatchTrace::new),
        };
        match config.stop_at {
            Some(at) if at < config.epoch => {
                warn!(stop_at = %at, epoch = %config.epoch, "configured stop time precedes epoch, ignored");
            }
            other => sim.stop_at = other,
        }
        sim
    }

    // ── Clock and state ───────────────────────────────────────

    /// Current virtual time.
    ///
    /// Inside a callback this is the dispatched event's time. After a
    /// run it is the time of the last dispatch, or the stop deadline if
    /// the run ended on one.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    pub fn epoch(&self) -> VirtualTime {
        self.epoch
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The largest time an event can be scheduled at.
    pub fn max_time(&self) -> VirtualTime {
        VirtualTime::MAX
    }

    /// Total events dispatched since construction or the last reset.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Number of live pending events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Returns `true` if there are no more events to dispatch.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    /// Context of the event being dispatched, or [`NO_CONTEXT`] outside
    /// a dispatch.
    pub fn context(&self) -> u32 {
        self.dispatching.map_or(NO_CONTEXT, |(_, context)| context)
    }

    /// Handle of the event being dispatched.
    pub fn current_event(&self) -> Option<EventId> {
        self.dispatching.map(|(id, _)| id)
    }

    // ── Scheduling ────────────────────────────────────────────

    /// Schedule `f` to run `delay` after the current time.
    ///
    /// The new event inherits the current context.
    pub fn schedule<F>(&mut self, delay: SimDuration, f: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_with_context(self.context(), delay, f)
    }

    /// Schedule `f` at the current time, after every event already
    /// pending at this instant.
    pub fn schedule_now<F>(&mut self, f: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule(SimDuration::ZERO, f)
    }

    /// Schedule `f` at an absolute virtual time.
    ///
    /// `at` equal to [`now`](Self::now) is allowed.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, f: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.check_absolute(at)?;
        Ok(self.insert(at, self.context(), infallible(f)))
    }

    /// Schedule `f` after `delay` under an explicit context (a node id,
    /// typically). Everything `f` schedules inherits that context.
    pub fn schedule_with_context<F>(
        &mut self,
        context: u32,
        delay: SimDuration,
        f: F,
    ) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        let at = self.resolve_delay(delay)?;
        Ok(self.insert(at, context, infallible(f)))
    }

    /// Schedule a fallible callback.
    ///
    /// If it returns an error when dispatched, the run loop stops
    /// immediately and `run` returns [`SimError::EventFailed`].
    pub fn try_schedule<F, E>(&mut self, delay: SimDuration, f: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) -> Result<(), E> + 'static,
        E: Into<CallbackError> + 'static,
    {
        self.try_schedule_with_context(self.context(), delay, f)
    }

    /// Fallible form of [`schedule_with_context`](Self::schedule_with_context).
    pub fn try_schedule_with_context<F, E>(
        &mut self,
        context: u32,
        delay: SimDuration,
        f: F,
    ) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) -> Result<(), E> + 'static,
        E: Into<CallbackError> + 'static,
    {
        let at = self.resolve_delay(delay)?;
        let action: Action = Box::new(move |sim: &mut Simulator| -> Result<(), CallbackError> {
            f(sim).map_err(Into::into)
        });
        Ok(self.insert(at, context, action))
    }

    fn resolve_delay(&self, delay: SimDuration) -> SimResult<VirtualTime> {
        if self.state.is_terminal() {
            return Err(SimError::SchedulerDestroyed);
        }
        if delay.is_negative() {
            return Err(SimError::InvalidDelay { delay });
        }
        self.now
            .checked_add(delay)
            .ok_or(SimError::TimeOverflow { now: self.now, delay })
    }

    fn check_absolute(&self, at: VirtualTime) -> SimResult<()> {
        if self.state.is_terminal() {
            return Err(SimError::SchedulerDestroyed);
        }
        if at < self.now {
            return Err(SimError::TimeInPast {
                requested: at,
                now: self.now,
            });
        }
        Ok(())
    }

    fn insert(&mut self, at: VirtualTime, context: u32, action: Action) -> EventId {
        self.initialize();
        self.scheduler.schedule(at, context, action)
    }

    fn initialize(&mut self) {
        if self.state == SchedulerState::Uninitialized {
            debug!(now = %self.now, "scheduler initialized");
            self.state = SchedulerState::Running;
        }
    }

    // ── Handles ───────────────────────────────────────────────

    /// Cancel a pending event. Its callback will never run.
    ///
    /// Returns `true` if the event was pending. Cancelling an event that
    /// already ran or was already cancelled is a no-op. A handle from
    /// another simulator is ignored with a warning.
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.scheduler.cancel(id) {
            CancelOutcome::Cancelled => true,
            CancelOutcome::AlreadyGone => false,
            CancelOutcome::Unknown => {
                warn!(event = %id, instance = id.instance(), now = %self.now, "cancel ignored: unknown event handle");
                false
            }
        }
    }

    /// Whether `id` is still waiting to be dispatched.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.scheduler.contains(id)
    }

    /// Whether `id` has run or been cancelled.
    pub fn is_expired(&self, id: EventId) -> bool {
        !self.is_pending(id)
    }

    /// Time remaining until `id` fires; zero once it has expired.
    pub fn delay_left(&self, id: EventId) -> SimResult<SimDuration> {
        if !self.scheduler.issued(id) {
            return Err(SimError::UnknownHandle(id));
        }
        Ok(self
            .scheduler
            .time_of(id)
            .map_or(SimDuration::ZERO, |at| at.since(self.now)))
    }

    // ── Stop conditions ───────────────────────────────────────

    /// Halt the run loop once the current callback returns.
    ///
    /// Events still pending, including those at the current instant,
    /// are left in place and resume on the next `run`. Outside a
    /// dispatch this has no effect: every `run` starts with the request
    /// cleared.
    pub fn stop(&mut self) {
        if self.dispatching.is_none() {
            debug!(now = %self.now, "stop() outside a run ignored");
            return;
        }
        if !self.stop_requested {
            debug!(now = %self.now, "stop requested");
            self.stop_requested = true;
        }
    }

    /// Halt the run loop after every event at or before `at` has been
    /// dispatched, leaving the clock at `at`.
    ///
    /// The earliest of several deadlines wins.
    pub fn stop_at(&mut self, at: VirtualTime) -> SimResult<()> {
        self.check_absolute(at)?;
        let deadline = self.stop_at.map_or(at, |current| current.min(at));
        if self.stop_at != Some(deadline) {
            debug!(now = %self.now, deadline = %deadline, "stop deadline set");
        }
        self.stop_at = Some(deadline);
        Ok(())
    }

    /// Relative form of [`stop_at`](Self::stop_at).
    pub fn stop_after(&mut self, delay: SimDuration) -> SimResult<()> {
        let at = self.resolve_delay(delay)?;
        self.stop_at(at)
    }

    /// The pending stop deadline, if any.
    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop_at
    }

    // ── Running ───────────────────────────────────────────────

    /// Run until the pending set is empty, a stop deadline is reached,
    /// `stop` is called or the simulator is destroyed.
    ///
    /// Returns the number of events dispatched by this call. An error
    /// from a fallible callback aborts the run and is returned as-is.
    pub fn run(&mut self) -> SimResult<u64> {
        self.enter_loop("run")?;
        self.stop_requested = false;
        self.state = SchedulerState::Running;
        debug!(now = %self.now, pending = self.scheduler.len(), "run started");

        let mut dispatched = 0u64;
        let result = loop {
            if self.stop_requested || self.state.is_terminal() {
                break Ok(());
            }
            match self.dispatch_next() {
                Ok(Some(_)) => dispatched += 1,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.stop_requested = false;
        if !self.state.is_terminal() {
            self.state = SchedulerState::Stopped;
        }
        debug!(now = %self.now, dispatched, pending = self.scheduler.len(), "run finished");
        result.map(|()| dispatched)
    }

    /// Install a deadline at `at`, then [`run`](Self::run).
    pub fn run_until(&mut self, at: VirtualTime) -> SimResult<u64> {
        self.stop_at(at)?;
        self.run()
    }

    /// Dispatch exactly one event.
    ///
    /// Returns the dispatched handle, or `None` if the pending set is
    /// empty or the next event lies beyond the stop deadline (in which
    /// case the clock moves to the deadline and the deadline is consumed).
    pub fn step(&mut self) -> SimResult<Option<EventId>> {
        self.enter_loop("step")?;
        self.initialize();
        self.dispatch_next()
    }

    /// Reject operations that need a live simulator and no callback on
    /// the stack.
    fn enter_loop(&self, operation: &'static str) -> SimResult<()> {
        if self.state.is_terminal() {
            return Err(SimError::SchedulerDestroyed);
        }
        if let Some((current, _)) = self.dispatching {
            return Err(SimError::ReentrantRun { operation, current });
        }
        Ok(())
    }

    fn dispatch_next(&mut self) -> SimResult<Option<EventId>> {
        let next = self.scheduler.peek_time();
        if let Some(deadline) = self.stop_at {
            if next.map_or(true, |t| t > deadline) {
                debug_assert!(deadline >= self.now, "stop deadline behind the clock");
                self.now = deadline;
                self.stop_at = None;
                debug!(now = %self.now, "stop deadline reached");
                return Ok(None);
            }
        }

        let Some(event) = self.scheduler.pop_next() else {
            return Ok(None);
        };
        let Event {
            id,
            scheduled_at,
            context,
            payload,
        } = event;

        debug_assert!(
            scheduled_at >= self.now,
            "time went backward: now={}, event={}",
            self.now,
            scheduled_at
        );
        self.now = scheduled_at;
        self.events_processed += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.record(id, scheduled_at, context);
        }
        trace!(event = %id, now = %self.now, context, "dispatch");

        let previous = self.dispatching.replace((id, context));
        let mut guard = Dispatching {
            sim: &mut *self,
            previous,
        };
        let outcome = payload(&mut *guard.sim);
        drop(guard);

        outcome.map_err(|source| SimError::EventFailed {
            id,
            at: scheduled_at,
            source,
        })?;
        Ok(Some(id))
    }

    // ── Teardown ──────────────────────────────────────────────

    /// Discard all pending events without running them and enter the
    /// terminal `Destroyed` state. Idempotent.
    ///
    /// Called from a callback, the run loop exits once that callback
    /// returns.
    pub fn destroy(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let dropped = self.scheduler.clear();
        self.stop_at = None;
        self.stop_requested = false;
        self.state = SchedulerState::Destroyed;
        debug!(now = %self.now, dropped, "scheduler destroyed");
    }

    /// Re-initialize for an independent run: empty pending set, clock
    /// back at the epoch, state `Uninitialized`.
    ///
    /// Handles issued before the reset become unknown to this simulator.
    /// Fails from inside a callback, and after [`destroy`](Self::destroy):
    /// a destroyed simulator stays destroyed.
    pub fn reset(&mut self) -> SimResult<()> {
        self.enter_loop("reset")?;
        let dropped = self.scheduler.clear();
        self.scheduler = Scheduler::new(next_instance());
        self.state = SchedulerState::Uninitialized;
        self.now = self.epoch;
        self.stop_at = None;
        self.stop_requested = false;
        self.events_processed = 0;
        if let Some(trace) = self.trace.as_mut() {
            trace.clear();
        }
        debug!(dropped, "scheduler reset");
        Ok(())
    }

    // ── Tracing ───────────────────────────────────────────────

    /// Start recording dispatches. Has no effect if already recording.
    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(DispatchTrace::new());
        }
    }

    /// The dispatch trace, if recording is enabled.
    pub fn trace(&self) -> Option<&DispatchTrace> {
        self.trace.as_ref()
    }
}

/// Marks an event as being dispatched for as long as its callback runs.
///
/// Dropping restores the previous marker, also when the callback
/// unwinds, so a simulator whose callback panicked can run again.
struct Dispatching<'a> {
    sim: &'a mut Simulator,
    previous: Option<(EventId, u32)>,
}

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        self.sim.dispatching = self.previous;
        if std::thread::panicking() && !self.sim.state.is_terminal() {
            self.sim.stop_requested = false;
            self.sim.state = SchedulerState::Stopped;
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("now", &self.now)
            .field("pending", &self.scheduler.len())
            .field("stop_at", &self.stop_at)
            .field("events_processed", &self.events_processed)
            .finish()
    }
}
