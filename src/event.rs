//! Event records and handles for the discrete-event kernel.
//!
//! An `Event` is an immutable record placed on the pending set and
//! dispatched in `(scheduled_at, sequence)` order. The payload type is
//! generic so the pending set can be exercised on plain data; the
//! simulator stores boxed callbacks there.

use std::cmp::Ordering;

use crate::time::VirtualTime;

/// Context value carried by events scheduled outside of any dispatch.
pub const NO_CONTEXT: u32 = u32::MAX;

// ── Event ID ──────────────────────────────────────────────────────────

/// Opaque handle to a scheduled event.
///
/// The sequence number is strictly increasing per scheduler and breaks
/// ties between events at the same `VirtualTime`. The instance tag
/// identifies which scheduler minted the handle, so a handle presented
/// to the wrong simulator is recognised as unknown rather than
/// silently aliasing a local event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId {
    instance: u64,
    seq: u64,
}

impl EventId {
    #[inline]
    pub fn new(instance: u64, seq: u64) -> Self {
        EventId { instance, seq }
    }

    /// Insertion sequence number within the issuing scheduler.
    #[inline]
    pub fn seq(self) -> u64 {
        self.seq
    }

    /// Tag of the scheduler instance that issued this handle.
    #[inline]
    pub fn instance(self) -> u64 {
        self.instance
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.seq)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Strictly-increasing event-ID generator owned by one scheduler.
#[derive(Debug, Clone)]
pub struct EventIdGen {
    instance: u64,
    next: u64,
}

impl EventIdGen {
    /// Create a generator for `instance` starting at sequence 0.
    pub fn new(instance: u64) -> Self {
        EventIdGen { instance, next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId::new(self.instance, self.next);
        self.next += 1;
        id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Whether `id` was minted by this generator.
    pub fn issued(&self, id: EventId) -> bool {
        id.instance == self.instance && id.seq < self.next
    }
}

// ── Event Key ─────────────────────────────────────────────────────────

/// Ordering key of the pending set: time first, then insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey {
    pub time: VirtualTime,
    pub seq: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single pending event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<A> {
    pub id: EventId,

    /// The virtual time at which this event is dispatched. Fixed at
    /// creation; rescheduling means cancel plus a new event.
    pub scheduled_at: VirtualTime,

    /// Context inherited by anything this event schedules.
    pub context: u32,

    pub payload: A,
}

impl<A> Event<A> {
    pub fn new(id: EventId, scheduled_at: VirtualTime, context: u32, payload: A) -> Self {
        Event {
            id,
            scheduled_at,
            context,
            payload,
        }
    }

    #[inline]
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.scheduled_at,
            seq: self.id.seq(),
        }
    }
}
