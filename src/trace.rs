//! Dispatch trace.
//!
//! Records every dispatched event into an append-only log so that two
//! runs of the same scenario can be compared for identical ordering,
//! either record by record or through a single rolling hash.

use std::io::{self, Write};

use crate::event::EventId;
use crate::time::VirtualTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── DispatchRecord ────────────────────────────────────────────────────

/// One dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchRecord {
    /// Position in dispatch order, starting at 0.
    pub index: u64,
    pub id: EventId,
    pub time: VirtualTime,
    pub context: u32,
}

// ── DispatchTrace ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DispatchTrace {
    records: Vec<DispatchRecord>,
}

impl DispatchTrace {
    pub fn new() -> Self {
        DispatchTrace {
            records: Vec::new(),
        }
    }

    /// Append a dispatch.
    pub fn record(&mut self, id: EventId, time: VirtualTime, context: u32) {
        let index = self.records.len() as u64;
        self.records.push(DispatchRecord {
            index,
            id,
            time,
            context,
        });
    }

    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Dispatch times in order. Handy for assertions.
    pub fn times(&self) -> Vec<VirtualTime> {
        self.records.iter().map(|r| r.time).collect()
    }

    /// Deterministic hash of the whole trace.
    ///
    /// Instance tags are left out so traces from different simulators
    /// running the same scenario hash equal.
    pub fn log_hash(&self) -> u64 {
        self.records.iter().fold(0u64, |h, r| {
            let h = hash_combine(h, r.id.seq());
            let h = hash_combine(h, r.time.nanos());
            hash_combine(h, r.context as u64)
        })
    }

    /// Write the trace in a line-oriented text format:
    /// `D <index> <seq> <time_ns> <context>`.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# CHRONON DISPATCH TRACE v1")?;
        writeln!(w, "# dispatches: {}", self.records.len())?;
        writeln!(w, "# hash: {:016x}", self.log_hash())?;
        for r in &self.records {
            writeln!(
                w,
                "D {} {} {} {}",
                r.index,
                r.id.seq(),
                r.time.nanos(),
                r.context
            )?;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Compare two traces for identical dispatch order, times and contexts.
pub fn traces_match(a: &DispatchTrace, b: &DispatchTrace) -> bool {
    a.records.len() == b.records.len()
        && a.records.iter().zip(b.records.iter()).all(|(ra, rb)| {
            ra.index == rb.index
                && ra.id.seq() == rb.id.seq()
                && ra.time == rb.time
                && ra.context == rb.context
        })
}
