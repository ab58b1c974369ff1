//! Every numeric knob spec.md leaves as "default, overridable", gathered
//! into one flat struct following `housaky-core`'s `AgiConfig` pattern: a
//! `Default` impl carrying the documented defaults, serde derives so a
//! deployment can override any of it from a TOML file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sg_arena::ArenaConfig;
use sg_safety::QualificationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Wall-clock budget handed to the sandbox for a single invocation.
    /// Per-locus `verify_within_ms`/contract overrides, when present, take
    /// precedence over this default.
    pub sandbox_deadline_ms: u64,
    pub convergence_window_ms: i64,
    pub resilience_window_ms: i64,
    pub fusion_threshold: u64,
    pub promotion_invocation_floor: u64,
    pub promotion_fitness_margin: f64,
    pub demotion_consecutive_failures: u32,
    pub regression_mild_threshold: f64,
    pub regression_severe_threshold: f64,
    pub regression_min_invocations: u64,
    pub fitness_ring_capacity: usize,
    pub shadow_required: u32,
    pub canary_required: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sandbox_deadline_ms: 30_000,
            convergence_window_ms: 30_000,
            resilience_window_ms: 3_600_000,
            fusion_threshold: 10,
            promotion_invocation_floor: 50,
            promotion_fitness_margin: 0.1,
            demotion_consecutive_failures: 3,
            regression_mild_threshold: 0.2,
            regression_severe_threshold: 0.4,
            regression_min_invocations: 10,
            fitness_ring_capacity: 256,
            shadow_required: 3,
            canary_required: 3,
        }
    }
}

impl RuntimeConfig {
    pub fn sandbox_deadline(&self) -> Duration {
        Duration::from_millis(self.sandbox_deadline_ms)
    }

    pub(crate) fn arena_config(&self) -> ArenaConfig {
        ArenaConfig {
            convergence_window_ms: self.convergence_window_ms,
            resilience_window_ms: self.resilience_window_ms,
            promotion_invocation_floor: self.promotion_invocation_floor,
            promotion_fitness_margin: self.promotion_fitness_margin,
            demotion_consecutive_failures: self.demotion_consecutive_failures,
            regression_mild_threshold: self.regression_mild_threshold,
            regression_severe_threshold: self.regression_severe_threshold,
            regression_min_invocations: self.regression_min_invocations,
            ring_capacity: self.fitness_ring_capacity,
        }
    }

    pub(crate) fn qualification_config(&self) -> QualificationConfig {
        QualificationConfig {
            shadow_required: self.shadow_required,
            canary_required: self.canary_required,
        }
    }
}
