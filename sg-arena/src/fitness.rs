//! The scalar fitness formula, spec.md §3: a three-way weighted blend of
//! resolved immediate/convergence/resilience success rates once enough of
//! the temporal record has resolved, falling back to a plain success ratio
//! before that. Grounded on `housaky-evolution::fitness::FitnessScore`'s
//! weighted-sum shape, generalized from that file's single post-hoc
//! build/test/perf/complexity blend to this three-window temporal one.

use crate::observation::{AlleleArenaState, Outcome, Resolvable};

const FULLY_RESOLVED_FLOOR: usize = 10;

/// Count of ring entries whose convergence *and* resilience slots have both
/// resolved — the gate spec.md calls "a fully-resolved temporal record".
fn fully_resolved_count(state: &AlleleArenaState) -> usize {
    state
        .ring
        .iter()
        .filter(|o| !o.convergence.is_pending() && !o.resilience.is_pending())
        .count()
}

fn resolved_rate<'a>(slots: impl Iterator<Item = &'a Resolvable>) -> Option<f64> {
    let (ok, total) = slots.fold((0u64, 0u64), |(ok, total), slot| match slot {
        Resolvable::Resolved(Outcome::Ok) => (ok + 1, total + 1),
        Resolvable::Resolved(Outcome::Fail) => (ok, total + 1),
        Resolvable::Pending(_) => (ok, total),
    });
    if total == 0 {
        None
    } else {
        Some(ok as f64 / total as f64)
    }
}

/// Recompute the scalar fitness of a single allele from its current ring and
/// lifetime counters. Called after every observation and every convergence/
/// resilience resolution — recomputing from the ring's current state is how
/// "retroactive decay" (spec.md §4.D) falls out naturally: a convergence
/// slot that resolves to failure simply changes what this function sees the
/// next time it runs.
pub fn compute(state: &AlleleArenaState) -> f64 {
    if fully_resolved_count(state) >= FULLY_RESOLVED_FLOOR {
        let p_immediate = {
            let total = state.ring.len() as f64;
            let ok = state.ring.iter().filter(|o| o.immediate.is_ok()).count() as f64;
            if total > 0.0 {
                ok / total
            } else {
                0.0
            }
        };
        let p_convergence = resolved_rate(state.ring.iter().map(|o| &o.convergence)).unwrap_or(0.0);
        let p_resilience = resolved_rate(state.ring.iter().map(|o| &o.resilience)).unwrap_or(0.0);
        (0.3 * p_immediate + 0.5 * p_convergence + 0.2 * p_resilience).clamp(0.0, 1.0)
    } else {
        state.total_successes as f64 / (state.total_invocations.max(10) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::AlleleArenaState;
    use sg_types::{Digest, Timestamp};

    fn digest() -> Digest {
        Digest::of_source("x")
    }

    #[test]
    fn fallback_formula_below_ten_resolved() {
        let mut state = AlleleArenaState::new(64);
        for i in 0..4 {
            let outcome = if i < 3 { Outcome::Ok } else { Outcome::Fail };
            state.push(digest(), outcome, Timestamp::from_millis(0));
        }
        // 3 successes out of 4 invocations, denominator floors at 10
        assert!((compute(&state) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn full_formula_once_ten_fully_resolved() {
        let mut state = AlleleArenaState::new(64);
        for _ in 0..10 {
            let id = state.push(digest(), Outcome::Ok, Timestamp::from_millis(0));
            let obs = state.find_mut(id).unwrap();
            obs.convergence = Resolvable::Resolved(Outcome::Ok);
            obs.resilience = Resolvable::Resolved(Outcome::Ok);
        }
        assert!((compute(&state) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pending_slots_do_not_lower_score() {
        let mut state = AlleleArenaState::new(64);
        for _ in 0..10 {
            let id = state.push(digest(), Outcome::Ok, Timestamp::from_millis(0));
            let obs = state.find_mut(id).unwrap();
            obs.convergence = Resolvable::Resolved(Outcome::Ok);
            obs.resilience = Resolvable::Resolved(Outcome::Ok);
        }
        // one more, still pending on both slots: not part of the
        // fully-resolved set, must not drag the score down.
        state.push(digest(), Outcome::Ok, Timestamp::from_millis(0));
        assert!((compute(&state) - 1.0).abs() < 1e-9);
    }
}
