//! Pending event set.
//!
//! A `BinaryHeap` of `Reverse<EventKey>` acts as a min-heap keyed by
//! `(scheduled_at, seq)`. Event bodies live in a separate map keyed by
//! sequence number; cancelling removes the body and leaves the key in
//! the heap as a tombstone that `pop_next` skips. Cancelled callbacks
//! (and whatever they captured) are therefore dropped immediately,
//! while the heap never needs removal-by-handle.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::trace;

use crate::event::{Event, EventId, EventIdGen, EventKey};
use crate::time::VirtualTime;

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The event was pending and will never run.
    Cancelled,
    /// The event already ran or was already cancelled.
    AlreadyGone,
    /// The handle was not issued by this scheduler.
    Unknown,
}

/// The deterministic pending set.
///
/// Owns the ordering heap, the live event bodies and the ID generator.
/// All scheduling goes through this struct so IDs stay monotonic and
/// dispatch order stays reproducible.
#[derive(Debug)]
pub struct Scheduler<A> {
    queue: BinaryHeap<Reverse<EventKey>>,
    live: BTreeMap<u64, Event<A>>,
    id_gen: EventIdGen,
}

impl<A> Scheduler<A> {
    /// Create an empty pending set whose handles carry `instance`.
    pub fn new(instance: u64) -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            live: BTreeMap::new(),
            id_gen: EventIdGen::new(instance),
        }
    }

    /// Insert an event at absolute time `at`.
    ///
    /// Time validation is the caller's job; the pending set only keeps
    /// order.
    pub fn schedule(&mut self, at: VirtualTime, context: u32, payload: A) -> EventId {
        let id = self.id_gen.next_id();
        let event = Event::new(id, at, context, payload);
        self.queue.push(Reverse(event.key()));
        self.live.insert(id.seq(), event);
        trace!(event = %id, at = %at, context, "event queued");
        id
    }

    /// Cancel a pending event.
    pub fn cancel(&mut self, id: EventId) -> CancelOutcome {
        if !self.id_gen.issued(id) {
            return CancelOutcome::Unknown;
        }
        match self.live.remove(&id.seq()) {
            Some(_) => {
                trace!(event = %id, "event cancelled");
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::AlreadyGone,
        }
    }

    /// Pop the live event with the smallest `(time, seq)`.
    ///
    /// Returns `None` when no live events remain.
    pub fn pop_next(&mut self) -> Option<Event<A>> {
        while let Some(Reverse(key)) = self.queue.pop() {
            if let Some(event) = self.live.remove(&key.seq) {
                return Some(event);
            }
        }
        None
    }

    /// Time of the next live event, discarding tombstones on the way.
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        while let Some(&Reverse(key)) = self.queue.peek() {
            if self.live.contains_key(&key.seq) {
                return Some(key.time);
            }
            self.queue.pop();
        }
        None
    }

    /// Whether `id` is still waiting to be dispatched.
    pub fn contains(&self, id: EventId) -> bool {
        self.id_gen.issued(id) && self.live.contains_key(&id.seq())
    }

    /// Scheduled time of a pending event.
    pub fn time_of(&self, id: EventId) -> Option<VirtualTime> {
        if id.instance() != self.id_gen.instance() {
            return None;
        }
        self.live.get(&id.seq()).map(|e| e.scheduled_at)
    }

    /// Whether `id` was minted by this pending set.
    pub fn issued(&self, id: EventId) -> bool {
        self.id_gen.issued(id)
    }

    /// Returns `true` if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of live (not cancelled, not dispatched) events.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Discard every pending event without dispatching it.
    ///
    /// Returns how many live events were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.live.len();
        self.queue.clear();
        self.live.clear();
        dropped
    }

    /// Drain all live events in dispatch order.
    #[cfg(test)]
    pub fn drain_ordered(&mut self) -> Vec<Event<A>> {
        let mut events = Vec::with_capacity(self.live.len());
        while let Some(e) = self.pop_next() {
            events.push(e);
        }
        events
    }
}
