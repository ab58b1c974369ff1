//! Temporal fitness is driven by externally scheduled callbacks: spec.md §5
//! says "the core exposes `schedule_convergence(observation_id, delay,
//! callback)` as a hook and does not own the timer." Background task
//! scheduling itself is out of scope here; this trait is the seam a
//! surrounding runtime hooks a real timer service into. The default
//! implementation is a no-op so the executor can always call it.

use sg_types::Digest;

pub trait VerificationScheduler: Send + Sync {
    /// A configuration step just succeeded and declared `verify_within_ms`;
    /// the scheduler should, after `delay_ms`, invoke the diagnostic locus
    /// and call back into the arena with `record_convergence`.
    fn schedule_convergence(
        &self,
        locus: &str,
        digest: Digest,
        observation_id: u64,
        delay_ms: i64,
        diagnostic_locus: &str,
    );

    /// Same shape, for the longer-horizon resilience check a high-risk
    /// allele's policy additionally requires.
    fn schedule_resilience(
        &self,
        locus: &str,
        digest: Digest,
        observation_id: u64,
        delay_ms: i64,
        diagnostic_locus: &str,
    );
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullScheduler;

impl VerificationScheduler for NullScheduler {
    fn schedule_convergence(&self, _locus: &str, _digest: Digest, _observation_id: u64, _delay_ms: i64, _diagnostic_locus: &str) {}

    fn schedule_resilience(&self, _locus: &str, _digest: Digest, _observation_id: u64, _delay_ms: i64, _diagnostic_locus: &str) {}
}
