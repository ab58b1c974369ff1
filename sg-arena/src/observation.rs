//! The per-invocation observation ring, spec.md §3's `FitnessRecord`
//! aggregate before it is collapsed into the scalar `sg-registry` persists.

use sg_types::{Digest, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Fail,
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// A temporal slot (convergence or resilience) that starts `Pending` and is
/// later resolved, either by an explicit report or by window expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolvable {
    Pending(Timestamp),
    Resolved(Outcome),
}

impl Resolvable {
    pub fn is_pending(self) -> bool {
        matches!(self, Resolvable::Pending(_))
    }

    pub fn resolved_outcome(self) -> Option<Outcome> {
        match self {
            Resolvable::Resolved(o) => Some(o),
            Resolvable::Pending(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub id: u64,
    pub input_digest: Digest,
    pub immediate: Outcome,
    pub convergence: Resolvable,
    pub resilience: Resolvable,
    pub recorded_at: Timestamp,
}

/// Per-allele state: the bounded observation ring plus the running peak
/// fitness the regression detector compares against.
pub(crate) struct AlleleArenaState {
    pub ring: std::collections::VecDeque<Observation>,
    pub capacity: usize,
    pub next_id: u64,
    pub peak_fitness: f64,
    pub invocations_at_peak: u64,
    /// Lifetime counters, unaffected by ring eviction: the fallback formula
    /// and the promotion invocation floor both need all-time totals, not
    /// just what is still in the bounded ring.
    pub total_invocations: u64,
    pub total_successes: u64,
    pub consecutive_failures: u32,
}

impl AlleleArenaState {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: std::collections::VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 0,
            peak_fitness: 0.0,
            invocations_at_peak: 0,
            total_invocations: 0,
            total_successes: 0,
            consecutive_failures: 0,
        }
    }

    pub fn push(&mut self, input_digest: Digest, immediate: Outcome, now: Timestamp) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.total_invocations += 1;
        if immediate.is_ok() {
            self.total_successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.ring.push_back(Observation {
            id,
            input_digest,
            immediate,
            convergence: Resolvable::Pending(now),
            resilience: Resolvable::Pending(now),
            recorded_at: now,
        });
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }
        id
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut Observation> {
        self.ring.iter_mut().find(|o| o.id == id)
    }
}
