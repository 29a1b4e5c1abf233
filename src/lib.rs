//! # chronon: virtual-time discrete-event simulation kernel
//!
//! The event scheduler underneath a network simulation: a virtual
//! clock, a totally ordered set of pending callbacks, and a run loop
//! that dispatches them in `(time, insertion order)` sequence. No
//! async, no threads, no wall-clock time.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │        Simulator          │ ← run loop, clock, stop, lifecycle
//! │  ┌─────────────────────┐  │
//! │  │  Scheduler<Action>  │  │ ← min-heap + lazy cancellation
//! │  │  ┌───────────────┐  │  │
//! │  │  │  Event / Id   │  │  │ ← (time, seq, context, callback)
//! │  │  └───────────────┘  │  │
//! │  └─────────────────────┘  │
//! │  VirtualTime/SimDuration  │ ← nanosecond logical clock
//! │  DispatchTrace (optional) │ ← determinism checks
//! └───────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod simulator;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use config::SimulatorConfig;
pub use error::{CallbackError, SimError, SimResult};
pub use event::{EventId, NO_CONTEXT};
pub use simulator::{SchedulerState, Simulator};
pub use time::{SimDuration, VirtualTime};
pub use trace::{DispatchRecord, DispatchTrace};
