//! Component D: central scoring and lifecycle authority, spec.md §4.D.
//! All lifecycle decisions for a single locus run under that locus's lock
//! (spec.md §5), obtained from a lazily-populated table — the same
//! lock-per-key idiom `housaky-core::orchestrator` uses for its subsystem
//! handles, narrowed here to one `parking_lot::Mutex<()>` per locus name.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sg_phenotype::PhenotypeMap;
use sg_registry::{FitnessSummary, Registry};
use sg_types::{Clock, Digest, Timestamp};

use crate::error::{ArenaError, Result};
use crate::fitness;
use crate::observation::{AlleleArenaState, Outcome, Resolvable};
use crate::regression::{RegressionEvent, RegressionKind, RegressionLog};

/// Every numeric knob spec.md leaves as "default, overridable" that this
/// crate owns. `sg-runtime::RuntimeConfig` carries the full set across all
/// components and constructs one of these for the arena it wires up.
#[derive(Debug, Clone, Copy)]
pub struct ArenaConfig {
    pub convergence_window_ms: i64,
    pub resilience_window_ms: i64,
    pub promotion_invocation_floor: u64,
    pub promotion_fitness_margin: f64,
    pub demotion_consecutive_failures: u32,
    pub regression_mild_threshold: f64,
    pub regression_severe_threshold: f64,
    pub regression_min_invocations: u64,
    pub ring_capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            convergence_window_ms: 30_000,
            resilience_window_ms: 3_600_000,
            promotion_invocation_floor: 50,
            promotion_fitness_margin: 0.1,
            demotion_consecutive_failures: 3,
            regression_mild_threshold: 0.2,
            regression_severe_threshold: 0.4,
            regression_min_invocations: 10,
            ring_capacity: 256,
        }
    }
}

/// A peer's reported fitness for one digest, supplied externally — the
/// arena never fetches this itself (spec.md §4.D: "the arena does not
/// fetch peer data itself").
#[derive(Debug, Clone, Copy)]
pub struct PeerReport {
    pub fitness: f64,
    pub invocations: u64,
}

pub struct Arena {
    root: PathBuf,
    registry: Arc<Registry>,
    phenotype: Arc<PhenotypeMap>,
    clock: Arc<dyn Clock>,
    config: ArenaConfig,
    state: RwLock<HashMap<Digest, AlleleArenaState>>,
    locus_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    regressions: RwLock<RegressionLog>,
    exhausted_loci: RwLock<HashSet<String>>,
}

impl Arena {
    pub fn open(
        root: impl AsRef<Path>,
        registry: Arc<Registry>,
        phenotype: Arc<PhenotypeMap>,
        clock: Arc<dyn Clock>,
        config: ArenaConfig,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let regressions = RegressionLog::load(&root).map_err(ArenaError::Io)?;
        Ok(Self {
            root,
            registry,
            phenotype,
            clock,
            config,
            state: RwLock::new(HashMap::new()),
            locus_locks: RwLock::new(HashMap::new()),
            regressions: RwLock::new(regressions),
            exhausted_loci: RwLock::new(HashSet::new()),
        })
    }

    fn locus_lock(&self, locus: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locus_locks.read().get(locus) {
            return lock.clone();
        }
        self.locus_locks
            .write()
            .entry(locus.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record one invocation's immediate result. Returns the observation id
    /// used to later resolve its convergence/resilience slots.
    pub fn record(&self, locus: &str, digest: Digest, input_digest: Digest, immediate: Outcome) -> Result<u64> {
        let lock = self.locus_lock(locus);
        let _guard = lock.lock();
        let now = self.clock.now();

        let id = {
            let mut states = self.state.write();
            let alstate = states
                .entry(digest)
                .or_insert_with(|| AlleleArenaState::new(self.config.ring_capacity));
            alstate.push(input_digest, immediate, now)
        };

        self.expire_and_recompute(digest, now)?;

        if !immediate.is_ok() {
            self.maybe_demote_on_consecutive_failures(locus, digest)?;
        }
        self.check_promotion(locus)?;
        Ok(id)
    }

    pub fn record_convergence(&self, locus: &str, digest: Digest, observation_id: u64, ok: bool) -> Result<()> {
        self.resolve_slot(locus, digest, observation_id, ok, Slot::Convergence)
    }

    pub fn record_resilience(&self, locus: &str, digest: Digest, observation_id: u64, ok: bool) -> Result<()> {
        self.resolve_slot(locus, digest, observation_id, ok, Slot::Resilience)
    }

    fn resolve_slot(&self, locus: &str, digest: Digest, observation_id: u64, ok: bool, slot: Slot) -> Result<()> {
        let lock = self.locus_lock(locus);
        let _guard = lock.lock();
        let now = self.clock.now();

        {
            let mut states = self.state.write();
            let alstate = states
                .get_mut(&digest)
                .ok_or(ArenaError::UnknownObservation(observation_id, digest))?;
            let obs = alstate
                .find_mut(observation_id)
                .ok_or(ArenaError::UnknownObservation(observation_id, digest))?;
            let outcome = if ok { Outcome::Ok } else { Outcome::Fail };
            match slot {
                Slot::Convergence => obs.convergence = Resolvable::Resolved(outcome),
                Slot::Resilience => obs.resilience = Resolvable::Resolved(outcome),
            }
        }

        self.expire_and_recompute(digest, now)?;
        self.check_promotion(locus)?;
        Ok(())
    }

    /// Expire any pending slot older than its window, recompute the scalar
    /// fitness from the current ring, write it through to the registry, and
    /// run the regression check. Called after every mutation to a digest's
    /// ring so the registry's persisted summary never goes stale.
    fn expire_and_recompute(&self, digest: Digest, now: Timestamp) -> Result<()> {
        let (locus, summary, regression) = {
            let mut states = self.state.write();
            let alstate = states.get_mut(&digest).expect("state present for digest being updated");

            for obs in alstate.ring.iter_mut() {
                if let Resolvable::Pending(started) = obs.convergence {
                    if now.duration_since_millis(started) >= self.convergence_window_ms_for() {
                        obs.convergence = Resolvable::Resolved(Outcome::Fail);
                    }
                }
                if let Resolvable::Pending(started) = obs.resilience {
                    if now.duration_since_millis(started) >= self.resilience_window_ms_for() {
                        obs.resilience = Resolvable::Resolved(Outcome::Fail);
                    }
                }
            }

            let score = fitness::compute(alstate);
            let summary = FitnessSummary {
                invocations: alstate.total_invocations,
                successes: alstate.total_successes,
                consecutive_failures: alstate.consecutive_failures,
                fitness: score,
            };

            let regression = self.check_regression(alstate, score);

            (self.registry.get(digest).map(|a| a.locus).unwrap_or_default(), summary, regression)
        };

        self.registry.update_fitness(digest, summary)?;

        if let Some(kind) = regression {
            self.on_regression(&locus, digest, kind, summary.fitness)?;
        }
        Ok(())
    }

    fn convergence_window_ms_for(&self) -> i64 {
        self.config.convergence_window_ms
    }

    fn resilience_window_ms_for(&self) -> i64 {
        self.config.resilience_window_ms
    }

    /// Update the running peak and report a regression kind if current
    /// fitness has dropped far enough below it, given enough invocations
    /// have elapsed since the peak was set.
    fn check_regression(&self, state: &mut AlleleArenaState, current: f64) -> Option<RegressionKind> {
        if current > state.peak_fitness {
            state.peak_fitness = current;
            state.invocations_at_peak = state.total_invocations;
            return None;
        }
        let elapsed = state.total_invocations.saturating_sub(state.invocations_at_peak);
        if elapsed < self.config.regression_min_invocations {
            return None;
        }
        let drop = state.peak_fitness - current;
        if drop >= self.config.regression_severe_threshold {
            Some(RegressionKind::Severe)
        } else if drop >= self.config.regression_mild_threshold {
            Some(RegressionKind::Mild)
        } else {
            None
        }
    }

    fn on_regression(&self, locus: &str, digest: Digest, kind: RegressionKind, fitness_at_event: f64) -> Result<()> {
        let peak_fitness = {
            let states = self.state.read();
            states.get(&digest).map(|s| s.peak_fitness).unwrap_or(fitness_at_event)
        };
        let event = RegressionEvent {
            locus: locus.to_string(),
            digest,
            kind,
            fitness_at_event,
            peak_fitness,
            recorded_at: self.clock.now(),
        };
        {
            let mut log = self.regressions.write();
            log.push(event);
            log.persist(&self.root).map_err(ArenaError::Io)?;
        }
        let is_dominant = matches!(self.phenotype.resolve(locus), Ok(d) if d == digest);
        if matches!(kind, RegressionKind::Severe) && is_dominant {
            tracing::warn!(locus, digest = %digest, "severe regression, demoting immediately");
            self.demote_ignoring_exhaustion(locus)?;
        } else {
            tracing::debug!(locus, digest = %digest, "mild regression recorded");
        }
        Ok(())
    }

    fn maybe_demote_on_consecutive_failures(&self, locus: &str, digest: Digest) -> Result<()> {
        let dominant = match self.phenotype.resolve(locus) {
            Ok(d) => d,
            Err(_) => return Ok(()),
        };
        if dominant != digest {
            return Ok(());
        }
        let consecutive = self
            .state
            .read()
            .get(&digest)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0);
        if consecutive >= self.config.demotion_consecutive_failures {
            tracing::warn!(locus, digest = %digest, consecutive, "demoting dominant allele on consecutive failures");
            self.demote_ignoring_exhaustion(locus)?;
        }
        Ok(())
    }

    fn demote_ignoring_exhaustion(&self, locus: &str) -> Result<()> {
        match self.phenotype.demote(locus) {
            Ok(()) => {
                self.exhausted_loci.write().remove(locus);
                Ok(())
            }
            Err(sg_phenotype::PhenotypeError::LocusExhausted(_)) => {
                tracing::warn!(locus, "locus exhausted on demotion");
                self.exhausted_loci.write().insert(locus.to_string());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// After every observation: promote a non-dominant allele that clears
    /// both the invocation floor and the fitness margin over the current
    /// dominant, or — if the locus has no dominant yet — the best allele
    /// with any positive fitness. Ties break on lowest digest (spec.md §9).
    fn check_promotion(&self, locus: &str) -> Result<()> {
        let digests = self.registry.list(locus);
        if digests.is_empty() {
            return Ok(());
        }

        let dominant = match self.phenotype.resolve(locus) {
            Ok(d) => Some(d),
            Err(sg_phenotype::PhenotypeError::UnknownLocus(_))
            | Err(sg_phenotype::PhenotypeError::LocusExhausted(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let dominant_fitness = match dominant {
            Some(d) => self.registry.get(d)?.fitness.fitness,
            None => 0.0,
        };

        let mut best: Option<(Digest, f64)> = None;
        for digest in digests {
            if Some(digest) == dominant {
                continue;
            }
            let allele = self.registry.get(digest)?;
            if !allele.state.is_living() {
                continue;
            }
            let eligible = match dominant {
                Some(_) => {
                    allele.fitness.invocations >= self.config.promotion_invocation_floor
                        && allele.fitness.fitness > dominant_fitness + self.config.promotion_fitness_margin
                }
                None => allele.fitness.fitness > 0.0,
            };
            if !eligible {
                continue;
            }
            let better = match best {
                None => true,
                Some((bd, bf)) => allele.fitness.fitness > bf || (allele.fitness.fitness == bf && digest < bd),
            };
            if better {
                best = Some((digest, allele.fitness.fitness));
            }
        }

        if let Some((digest, _)) = best {
            self.phenotype.promote(locus, digest)?;
            self.exhausted_loci.write().remove(locus);
        }
        Ok(())
    }

    /// Re-check every digest this arena has observed for `locus` against
    /// its expiry windows. Intended to be called periodically by whatever
    /// owns the process loop (`sg-runtime`), so a locus idle between
    /// invocations still has its pending temporal slots resolved to
    /// failure on schedule instead of only at the next recorded call.
    pub fn sweep_locus(&self, locus: &str) -> Result<()> {
        let digests: Vec<Digest> = self.registry.list(locus);
        let now = self.clock.now();
        for digest in digests {
            if self.state.read().contains_key(&digest) {
                self.expire_and_recompute(digest, now)?;
            }
        }
        self.check_promotion(locus)?;
        Ok(())
    }

    /// Local fitness blended with an externally-supplied peer report, per
    /// spec.md §4.D's distributed-fitness formula. The arena never fetches
    /// peer data itself; callers supply it.
    pub fn effective_fitness(&self, digest: Digest, peer: Option<PeerReport>) -> Result<f64> {
        let local = self.registry.get(digest)?.fitness.fitness;
        Ok(match peer {
            Some(p) if p.invocations >= 10 => 0.7 * local + 0.3 * p.fitness,
            _ => local,
        })
    }

    /// Regression events recorded for `locus`, most-recent last. Returned
    /// as an owned `Vec` rather than spec.md's `&[RegressionEvent]` — the
    /// log lives behind a lock this crate must release before returning
    /// (SPEC_FULL.md §3 supplement).
    pub fn recent_regressions(&self, locus: &str) -> Vec<RegressionEvent> {
        self.regressions.read().recent(locus)
    }

    pub fn is_locus_exhausted(&self, locus: &str) -> bool {
        self.exhausted_loci.read().contains(locus)
    }
}

enum Slot {
    Convergence,
    Resilience,
}
