//! Shadow/canary qualification counters, spec.md §4.E: a newly generated
//! high/critical allele must clear N consecutive shadow-kernel successes
//! before advancing to canary, then N consecutive canary successes before
//! the caller may move it into the live recessive pool. This crate only
//! tracks the counters and reports stage crossings; the lifecycle state
//! transition itself is `sg-registry::set_state`, called by whoever drives
//! the pathway executor once a crossing is reported.

use std::collections::HashMap;

use parking_lot::RwLock;
use sg_types::Digest;

#[derive(Debug, Clone, Copy)]
pub struct QualificationConfig {
    pub shadow_required: u32,
    pub canary_required: u32,
}

impl Default for QualificationConfig {
    fn default() -> Self {
        Self { shadow_required: 3, canary_required: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualificationStage {
    ShadowKernel,
    Canary,
    Cleared,
}

#[derive(Default)]
struct Counter {
    stage: Option<QualificationStage>,
    consecutive: u32,
}

/// Per-(locus, digest) shadow/canary consecutive-success counters. A single
/// tracker is shared across every high/critical allele the runtime is
/// currently qualifying.
pub struct QualificationTracker {
    config: QualificationConfig,
    counters: RwLock<HashMap<(String, Digest), Counter>>,
}

impl QualificationTracker {
    pub fn new(config: QualificationConfig) -> Self {
        Self { config, counters: RwLock::new(HashMap::new()) }
    }

    pub fn stage(&self, locus: &str, digest: Digest) -> QualificationStage {
        self.counters
            .read()
            .get(&(locus.to_string(), digest))
            .and_then(|c| c.stage)
            .unwrap_or(QualificationStage::ShadowKernel)
    }

    /// Record one shadow-kernel run's result. A run against a mock
    /// capability with production topology replayed in memory (spec.md
    /// §4.E) — this tracker does not execute it, only scores the outcome.
    pub fn record_shadow(&self, locus: &str, digest: Digest, ok: bool) -> QualificationStage {
        self.record(locus, digest, ok, QualificationStage::ShadowKernel, self.config.shadow_required, QualificationStage::Canary)
    }

    /// Record one canary run's result (live capability, full transactional
    /// wrapping).
    pub fn record_canary(&self, locus: &str, digest: Digest, ok: bool) -> QualificationStage {
        self.record(locus, digest, ok, QualificationStage::Canary, self.config.canary_required, QualificationStage::Cleared)
    }

    fn record(
        &self,
        locus: &str,
        digest: Digest,
        ok: bool,
        at_stage: QualificationStage,
        required: u32,
        advance_to: QualificationStage,
    ) -> QualificationStage {
        let mut counters = self.counters.write();
        let counter = counters.entry((locus.to_string(), digest)).or_default();
        if counter.stage.is_none() {
            counter.stage = Some(at_stage);
        }
        if counter.stage != Some(at_stage) {
            // already advanced past this stage; report current stage unchanged
            return counter.stage.unwrap();
        }
        if ok {
            counter.consecutive += 1;
            if counter.consecutive >= required {
                counter.stage = Some(advance_to);
                counter.consecutive = 0;
            }
        } else {
            counter.consecutive = 0;
        }
        counter.stage.unwrap()
    }
}
