//! Lifecycle states of a [`Simulator`](super::Simulator).

/// ```text
/// Uninitialized ──schedule/run──▶ Running ◀──run── Stopped
///                                    │               ▲
///                                    └──run ends─────┘
/// (any) ──destroy──▶ Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SchedulerState {
    /// Freshly constructed or reset; nothing scheduled or run yet.
    Uninitialized,
    /// Accepting work; a run loop may be in progress.
    Running,
    /// The last run returned. Scheduling is still allowed and a new
    /// run resumes from the remaining events.
    Stopped,
    /// Terminal. Pending events were discarded; no further work.
    Destroyed,
}

impl SchedulerState {
    pub fn is_terminal(self) -> bool {
        self == SchedulerState::Destroyed
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchedulerState::Uninitialized => "uninitialized",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
            SchedulerState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
