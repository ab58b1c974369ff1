//! Process-wide wiring and lifecycle, spec.md §9: "the registry, phenotype,
//! arena, and fusion tracker are process-wide singletons with an explicit
//! lifecycle (`open(root) -> handle`, `close(handle)`)." Grounded on
//! `housaky-core::orchestrator::AgiOrchestrator::new`'s subsystem
//! construction order, without that orchestrator's event channel,
//! cancellation token, or metrics macros — this runtime has no networked
//! subsystems to coordinate shutdown for.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use sg_arena::Arena;
use sg_fusion::FusionTracker;
use sg_mutation::{MutationEngine, MutationOrchestrator};
use sg_pathway::{ExecutionContext, PathwayExecutor};
use sg_phenotype::PhenotypeMap;
use sg_registry::Registry;
use sg_safety::QualificationTracker;
use sg_sandbox::Loader;
use sg_types::SystemClock;

use crate::config::RuntimeConfig;
use crate::error::Result;

/// The opened runtime: every core subsystem, constructed once per process
/// against one project root. Cloning is cheap (every field is an `Arc`);
/// hand clones to worker tasks rather than sharing `&SgHandle` across an
/// await boundary you don't control.
#[derive(Clone)]
pub struct SgHandle {
    root: PathBuf,
    pub registry: Arc<Registry>,
    pub phenotype: Arc<PhenotypeMap>,
    pub loader: Arc<Loader>,
    pub arena: Arc<Arena>,
    pub fusion: Arc<FusionTracker>,
    pub mutation: Arc<MutationOrchestrator>,
    pub qualification: Arc<QualificationTracker>,
    pub executor: Arc<PathwayExecutor>,
    config: RuntimeConfig,
}

impl SgHandle {
    /// Open (or initialise) every subsystem under `root`. The mutation
    /// engine is injected rather than constructed here: spec.md §1 treats
    /// "the LLM/mock mutation engine" as an opaque external collaborator
    /// the core never builds for itself.
    pub fn open(root: impl AsRef<Path>, mutation_engine: Arc<dyn MutationEngine>, config: RuntimeConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!(root = %root.display(), "opening runtime");

        let registry = Arc::new(Registry::open(&root)?);
        let phenotype = Arc::new(PhenotypeMap::open(&root, registry.clone())?);
        let loader = Arc::new(Loader::new());
        let clock = Arc::new(SystemClock) as Arc<dyn sg_types::Clock>;
        let arena = Arc::new(Arena::open(&root, registry.clone(), phenotype.clone(), clock.clone(), config.arena_config())?);
        let fusion = Arc::new(FusionTracker::open(&root, phenotype.clone(), config.fusion_threshold)?);
        let mutation = Arc::new(MutationOrchestrator::new(registry.clone(), phenotype.clone(), loader.clone(), mutation_engine, clock));
        let qualification = Arc::new(QualificationTracker::new(config.qualification_config()));
        let executor = Arc::new(PathwayExecutor::new(
            registry.clone(),
            phenotype.clone(),
            loader.clone(),
            arena.clone(),
            fusion.clone(),
            mutation.clone(),
        ));

        info!(root = %root.display(), "runtime opened");
        Ok(Self { root, registry, phenotype, loader, arena, fusion, mutation, qualification, executor, config })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Every observation a step's contract declares `verify_within_ms` for
    /// needs a `sandbox_deadline` baked into the [`ExecutionContext`] it
    /// runs under; this is the default this runtime's config carries.
    pub fn sandbox_deadline(&self) -> std::time::Duration {
        self.config.sandbox_deadline()
    }

    /// On-disk paths that make up one consistent snapshot of this project
    /// root. Archiving them into a shippable artifact is out of scope
    /// (spec.md §1); this is the list an external archiver consumes.
    pub fn snapshot_paths(&self) -> Vec<PathBuf> {
        vec![
            self.root.join(".sg/registry/index.json"),
            self.root.join(".sg/regression.json"),
            self.root.join("phenotype.toml"),
            self.root.join("fusion_tracker.json"),
        ]
    }

    /// Sweep every named locus's arena counters and fire any due
    /// exhaustion-regression mutations. Spec.md §4's background tasks
    /// (periodic regression sweeps, convergence/resilience callbacks) are
    /// all driven externally; this is the single entry point such a driver
    /// calls, never a loop this runtime runs on its own.
    pub async fn maintenance_tick(&self, loci: &[String], ctx: &ExecutionContext<'_>) -> Result<()> {
        for locus in loci {
            self.arena.sweep_locus(locus)?;
            self.executor.handle_regressions(locus, ctx).await?;
        }
        Ok(())
    }

    /// No subsystem here buffers writes in memory past the call that made
    /// them (registry/phenotype/arena/fusion all persist synchronously on
    /// every mutation), so there is nothing for `close` to flush. It exists
    /// to satisfy spec.md §9's explicit `open -> close` lifecycle contract
    /// and as the seam a future buffered backend would hook into.
    pub fn close(self) {
        info!(root = %self.root.display(), "closing runtime");
    }
}
