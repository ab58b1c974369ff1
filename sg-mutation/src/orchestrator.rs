//! Component H: mutation orchestration, spec.md §4.H. Collapses
//! `housaky-evolution::dgm`'s two-stage "build an `ImprovementProposal`,
//! then call out for a candidate" shape, and `mutation.rs`'s
//! validate-then-apply discipline, into a single `mutate(locus, trigger,
//! context) -> digest` contract: generate, validate loadability, store,
//! install per risk policy.

use std::sync::Arc;

use sg_registry::{LifecycleState, MutationContext as RegistryMutationContext, Registry};
use sg_phenotype::PhenotypeMap;
use sg_sandbox::Loader;
use sg_types::{canonicalise, Clock, Digest, RiskClass};

use crate::error::{MutationError, Result};
use crate::prompt::{MutationEngine, MutationRequest, PromptDocument, Trigger};

pub struct MutationOrchestrator {
    registry: Arc<Registry>,
    phenotype: Arc<PhenotypeMap>,
    loader: Arc<Loader>,
    engine: Arc<dyn MutationEngine>,
    clock: Arc<dyn Clock>,
}

impl MutationOrchestrator {
    pub fn new(
        registry: Arc<Registry>,
        phenotype: Arc<PhenotypeMap>,
        loader: Arc<Loader>,
        engine: Arc<dyn MutationEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { registry, phenotype, loader, engine, clock }
    }

    /// Locus-scoped mutation: triggers `exhausted`, `regression`, and
    /// `proactive`. Installs the new allele at shadow (if `risk`'s policy
    /// requires shadow pre-qualification) or directly into the fallback
    /// stack otherwise — never as dominant; promotion is `sg-arena`'s rule.
    pub async fn mutate_locus(
        &self,
        locus: &str,
        trigger: Trigger,
        request: MutationRequest,
        risk: RiskClass,
        parent: Option<Digest>,
    ) -> Result<Digest> {
        let digest = self.generate_and_store(locus, trigger, &request, parent).await?;
        if sg_safety::policy_for(risk).shadow_prequal {
            self.registry.set_state(digest, LifecycleState::Shadow)?;
        }
        self.phenotype.add_candidate(locus, digest)?;
        Ok(digest)
    }

    /// Fusion-scoped mutation, trigger `fusion`: stores the composed allele
    /// under the pathway's name but does not touch the phenotype map —
    /// spec.md §4.H: "installed as the fused allele for the pathway
    /// (bypassing the normal phenotype entry)". The caller installs it via
    /// `sg_fusion::FusionTracker::install_fused_allele`.
    pub async fn mutate_fusion(&self, pathway_name: &str, request: MutationRequest) -> Result<Digest> {
        self.generate_and_store(pathway_name, Trigger::Fusion, &request, None).await
    }

    async fn generate_and_store(
        &self,
        locus: &str,
        trigger: Trigger,
        request: &MutationRequest,
        parent: Option<Digest>,
    ) -> Result<Digest> {
        let prompt = PromptDocument::build(locus, trigger, request);
        let source = self.engine.generate(&prompt).await.map_err(|detail| {
            tracing::error!(locus, trigger = ?trigger, error = %detail, "mutation engine failed");
            MutationError::EngineFailure { locus: locus.to_string(), detail }
        })?;

        let probe_digest = Digest::of_source(&canonicalise(&source));
        if let Err(e) = self.loader.load(probe_digest, &source) {
            let detail = format!("generated source rejected at load: {e}");
            tracing::error!(locus, error = %detail, "mutation result unusable, not persisted");
            return Err(MutationError::EngineFailure { locus: locus.to_string(), detail });
        }

        let mut mutation_ctx = RegistryMutationContext::default();
        mutation_ctx.failing_input_digest = request.failing_input.as_deref().map(|s| Digest::of_source(&canonicalise(s)));
        mutation_ctx.error_summary = request.error_summary.clone();
        for (i, obs) in request.diagnostic_observations.iter().enumerate() {
            mutation_ctx.diagnostics.insert(format!("observation_{i}"), obs.clone());
        }

        let now = self.clock.now();
        let digest = self.registry.put(&source, locus, parent, mutation_ctx, now)?;
        tracing::info!(locus, digest = %digest, trigger = ?trigger, "mutation stored");
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sg_types::SystemClock;

    struct EchoEngine {
        source: String,
    }

    #[async_trait]
    impl MutationEngine for EchoEngine {
        async fn generate(&self, _prompt: &PromptDocument) -> std::result::Result<String, String> {
            Ok(self.source.clone())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl MutationEngine for FailingEngine {
        async fn generate(&self, _prompt: &PromptDocument) -> std::result::Result<String, String> {
            Err("no idea".to_string())
        }
    }

    fn setup(engine: Arc<dyn MutationEngine>) -> (tempfile::TempDir, MutationOrchestrator, Arc<Registry>, Arc<PhenotypeMap>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());
        let phenotype = Arc::new(PhenotypeMap::open(dir.path(), registry.clone()).unwrap());
        let loader = Arc::new(Loader::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let orchestrator = MutationOrchestrator::new(registry.clone(), phenotype.clone(), loader, engine, clock);
        (dir, orchestrator, registry, phenotype)
    }

    #[tokio::test]
    async fn locus_mutation_at_low_risk_skips_shadow_and_joins_fallback() {
        let engine = Arc::new(EchoEngine { source: r#"{"execute": {"op": "var", "name": "input"}}"#.to_string() });
        let (_dir, orchestrator, registry, phenotype) = setup(engine);
        let digest = orchestrator
            .mutate_locus("x", Trigger::Exhausted, MutationRequest::default(), RiskClass::Low, None)
            .await
            .unwrap();
        let allele = registry.get(digest).unwrap();
        assert_eq!(allele.state, LifecycleState::Recessive);
        let (dominant, _) = phenotype.resolve_with_stack("x").unwrap();
        assert_eq!(dominant, digest);
    }

    #[tokio::test]
    async fn locus_mutation_at_high_risk_installs_shadow() {
        let engine = Arc::new(EchoEngine { source: r#"{"execute": {"op": "var", "name": "input"}}"#.to_string() });
        let (_dir, orchestrator, registry, _phenotype) = setup(engine);
        let digest = orchestrator
            .mutate_locus("x", Trigger::Regression, MutationRequest::default(), RiskClass::High, None)
            .await
            .unwrap();
        let allele = registry.get(digest).unwrap();
        assert_eq!(allele.state, LifecycleState::Shadow);
    }

    #[tokio::test]
    async fn engine_failure_persists_nothing() {
        let (_dir, orchestrator, registry, _phenotype) = setup(Arc::new(FailingEngine));
        let err = orchestrator
            .mutate_locus("x", Trigger::Exhausted, MutationRequest::default(), RiskClass::Low, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::EngineFailure { .. }));
        assert!(registry.list("x").is_empty());
    }

    #[tokio::test]
    async fn missing_entry_point_persists_nothing() {
        let engine = Arc::new(EchoEngine { source: "{}".to_string() });
        let (_dir, orchestrator, registry, _phenotype) = setup(engine);
        let err = orchestrator
            .mutate_locus("x", Trigger::Exhausted, MutationRequest::default(), RiskClass::Low, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::EngineFailure { .. }));
        assert!(registry.list("x").is_empty());
    }

    #[tokio::test]
    async fn fusion_mutation_does_not_touch_phenotype() {
        let engine = Arc::new(EchoEngine { source: r#"{"execute": {"op": "var", "name": "input"}}"#.to_string() });
        let (_dir, orchestrator, registry, phenotype) = setup(engine);
        let digest = orchestrator.mutate_fusion("p", MutationRequest::default()).await.unwrap();
        assert!(registry.get(digest).is_ok());
        assert!(matches!(phenotype.resolve("p"), Err(sg_phenotype::PhenotypeError::UnknownLocus(_))));
    }
}
