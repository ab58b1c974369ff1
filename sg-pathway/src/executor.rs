//! Component F: the pathway executor. Resolves a parsed pathway contract's
//! step DAG against the phenotype map, invokes each step's dominant allele
//! (falling back through its stack on failure per spec.md §4.F), and wires
//! every invocation into the safety, arena, fusion, and mutation components
//! it sits between.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sg_arena::{Arena, Outcome};
use sg_fusion::{FusionOutcome, FusionTracker};
use sg_mutation::{MutationOrchestrator, MutationRequest, Trigger};
use sg_phenotype::PhenotypeMap;
use sg_registry::Registry;
use sg_safety::{CapabilityTable, Transaction, TransactionalCapability};
use sg_sandbox::{Capability, Loader, Value};
use sg_types::{canonicalise, Contract, ContractKind, Digest, Family, Param, RiskClass, ScalarType, StepDecl};

use crate::binding::BindingContext;
use crate::contracts::ContractLookup;
use crate::dag::{self, direct_dependents};
use crate::scheduler::VerificationScheduler;
use crate::types::{PathwayResult, StepOutcome, StepStatus};
use crate::{PathwayError, Result};

/// Everything an in-flight run needs that is not owned by the executor
/// itself: the injected capability object, its undo-log registry, the
/// contract table, the verification hook, and the sandbox's time budget.
pub struct ExecutionContext<'a> {
    pub capability: &'a dyn Capability,
    pub capability_table: &'a CapabilityTable,
    pub contracts: &'a dyn ContractLookup,
    pub scheduler: &'a dyn VerificationScheduler,
    pub sandbox_deadline: Duration,
}

type HandledRegression = (String, Digest, i64);

pub struct PathwayExecutor {
    registry: Arc<Registry>,
    phenotype: Arc<PhenotypeMap>,
    loader: Arc<Loader>,
    arena: Arc<Arena>,
    fusion: Arc<FusionTracker>,
    mutation: Arc<MutationOrchestrator>,
    handled_regressions: Mutex<HashSet<HandledRegression>>,
}

impl PathwayExecutor {
    pub fn new(
        registry: Arc<Registry>,
        phenotype: Arc<PhenotypeMap>,
        loader: Arc<Loader>,
        arena: Arc<Arena>,
        fusion: Arc<FusionTracker>,
        mutation: Arc<MutationOrchestrator>,
    ) -> Self {
        Self { registry, phenotype, loader, arena, fusion, mutation, handled_regressions: Mutex::new(HashSet::new()) }
    }

    /// Run `pathway` against `input`. If the pathway has a standing fused
    /// allele, invoke it directly (spec.md §4.G's "fused shortcut"); on
    /// failure the fusion tracker decomposes it and this falls through to
    /// the normal per-step resolution below, in the same call.
    pub async fn run(&self, pathway: &Contract, input: Value, ctx: &ExecutionContext<'_>) -> Result<PathwayResult> {
        let fused = self.phenotype.pathway_state(&pathway.name).fused_allele;
        if let Some(digest) = fused {
            match self.invoke_fused(&pathway.name, digest, &input, ctx).await {
                Ok(output) => {
                    self.fusion.observe(&pathway.name, vec![digest], FusionOutcome::Success)?;
                    return Ok(PathwayResult {
                        pathway_name: pathway.name.clone(),
                        success: true,
                        steps: vec![StepOutcome {
                            index: 0,
                            locus: pathway.name.clone(),
                            status: StepStatus::Succeeded,
                            digest: Some(digest),
                            output: Some(output),
                        }],
                        composition: vec![digest],
                    });
                }
                Err(e) => {
                    tracing::info!(pathway = %pathway.name, error = %e, "fused allele failed, decomposing");
                    self.fusion.observe(&pathway.name, vec![digest], FusionOutcome::Failure)?;
                }
            }
        }
        self.run_steps(pathway, &input, ctx).await
    }

    async fn invoke_fused(&self, _pathway_name: &str, digest: Digest, input: &Value, ctx: &ExecutionContext<'_>) -> Result<Value> {
        let allele = self.registry.get(digest)?;
        let unit = self.loader.load(digest, &allele.source)?;
        let raw = unit.execute(&input.render_json(), ctx.capability, ctx.sandbox_deadline)?;
        Value::parse_json(&raw).map_err(|e| PathwayError::Io(anyhow::anyhow!("fused allele returned invalid JSON: {e}")))
    }

    /// Dry-run: resolve every step's current dominant allele without
    /// invoking anything. Never fails on a per-locus basis — an
    /// unresolvable locus is reported as an unresolved step, not an error.
    pub fn plan(&self, pathway: &Contract, _ctx: &ExecutionContext<'_>) -> Result<PathwayResult> {
        let order = dag::topo_order(&pathway.steps)
            .map_err(|detail| PathwayError::Binding { pathway: pathway.name.clone(), step: 0, detail })?;
        let mut steps = Vec::with_capacity(order.len());
        let mut composition = Vec::new();
        for idx in order {
            let step = &pathway.steps[idx];
            match self.phenotype.resolve_with_stack(&step.locus) {
                Ok((dominant, _)) => {
                    composition.push(dominant);
                    steps.push(StepOutcome {
                        index: step.index,
                        locus: step.locus.clone(),
                        status: StepStatus::Planned,
                        digest: Some(dominant),
                        output: None,
                    });
                }
                Err(_) => steps.push(StepOutcome {
                    index: step.index,
                    locus: step.locus.clone(),
                    status: StepStatus::Planned,
                    digest: None,
                    output: None,
                }),
            }
        }
        Ok(PathwayResult { pathway_name: pathway.name.clone(), success: true, steps, composition })
    }

    fn run_boxed<'a>(
        &'a self,
        pathway: &'a Contract,
        input: Value,
        ctx: &'a ExecutionContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<PathwayResult>> + Send + 'a>> {
        Box::pin(self.run(pathway, input, ctx))
    }

    async fn run_steps(&self, pathway: &Contract, input: &Value, ctx: &ExecutionContext<'_>) -> Result<PathwayResult> {
        let order = dag::topo_order(&pathway.steps)
            .map_err(|detail| PathwayError::Binding { pathway: pathway.name.clone(), step: 0, detail })?;

        let mut outputs: HashMap<usize, Value> = HashMap::new();
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(order.len());
        let mut composition: Vec<Digest> = Vec::new();
        let mut pending: Vec<(usize, Transaction)> = Vec::new();
        let mut skip: HashSet<usize> = HashSet::new();

        for idx in order {
            let step = &pathway.steps[idx];

            if skip.contains(&step.index) {
                outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Skipped, digest: None, output: None });
                continue;
            }

            let mut binding_ctx = BindingContext::new(input, &outputs);
            if let Some(guard) = &step.guard {
                let passes = binding_ctx
                    .resolve_guard(guard)
                    .map_err(|detail| PathwayError::Binding { pathway: pathway.name.clone(), step: step.index, detail })?;
                if !passes {
                    outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Skipped, digest: None, output: None });
                    continue;
                }
            }

            let sub_pathway = ctx.contracts.locus(&step.locus).filter(|c| c.kind == ContractKind::Pathway);

            if let Some(sub) = sub_pathway {
                let bound = self.bind_inputs(step, &binding_ctx, &pathway.name)?;
                let sub_result = self.run_boxed(&sub, bound, ctx).await?;
                composition.extend(sub_result.composition.iter().copied());
                let sub_output = sub_result.steps.iter().rev().find_map(|s| s.output.clone());
                if sub_result.success {
                    if let Some(out) = sub_output.clone() {
                        outputs.insert(step.index, out.clone());
                    }
                    outcomes.push(StepOutcome {
                        index: step.index,
                        locus: step.locus.clone(),
                        status: StepStatus::Succeeded,
                        digest: sub_result.composition.last().copied(),
                        output: sub_output,
                    });
                } else {
                    outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Failed, digest: None, output: None });
                    if self.apply_failure_policy(step, &mut pending, ctx, &pathway.steps, &mut skip).await? {
                        break;
                    }
                }
                continue;
            }

            if let Some(iterate_expr) = &step.iterate_over {
                let items = binding_ctx
                    .resolve_iterate(iterate_expr)
                    .map_err(|detail| PathwayError::Binding { pathway: pathway.name.clone(), step: step.index, detail })?;
                let mut collected = Vec::with_capacity(items.len());
                let mut exhausted = false;
                for item in items {
                    let mut item_ctx = BindingContext::new(input, &outputs);
                    item_ctx.vars.insert("item".to_string(), item);
                    let bound = self.bind_inputs(step, &item_ctx, &pathway.name)?;
                    match self.invoke_locus(step, &bound, ctx, &mut pending).await {
                        Ok((digest, output)) => {
                            composition.push(digest);
                            collected.push(output);
                        }
                        Err(PathwayError::LocusExhausted { locus }) => {
                            exhausted = true;
                            self.trigger_exhaustion_mutation(step, &bound, ctx).await;
                            let _ = locus;
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
                if exhausted {
                    outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Failed, digest: None, output: None });
                    if self.apply_failure_policy(step, &mut pending, ctx, &pathway.steps, &mut skip).await? {
                        break;
                    }
                } else {
                    let out = Value::List(collected);
                    outputs.insert(step.index, out.clone());
                    outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Succeeded, digest: None, output: Some(out) });
                }
                continue;
            }

            let bound = self.bind_inputs(step, &binding_ctx, &pathway.name)?;
            match self.invoke_locus(step, &bound, ctx, &mut pending).await {
                Ok((digest, output)) => {
                    composition.push(digest);
                    outputs.insert(step.index, output.clone());
                    outcomes.push(StepOutcome {
                        index: step.index,
                        locus: step.locus.clone(),
                        status: StepStatus::Succeeded,
                        digest: Some(digest),
                        output: Some(output),
                    });
                }
                Err(PathwayError::LocusExhausted { locus }) => {
                    let _ = locus;
                    outcomes.push(StepOutcome { index: step.index, locus: step.locus.clone(), status: StepStatus::Failed, digest: None, output: None });
                    self.trigger_exhaustion_mutation(step, &bound, ctx).await;
                    if self.apply_failure_policy(step, &mut pending, ctx, &pathway.steps, &mut skip).await? {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let success = !outcomes.iter().any(|o| o.status == StepStatus::Failed);

        // Every transaction still pending at this point belongs to a step
        // that succeeded and was never rolled back by a later rollback-all;
        // now that the run's final outcome is known, those undo logs are
        // truly discarded. See DESIGN.md: commit is deferred to here, not
        // performed per-step, precisely so rollback-all can still reverse
        // an earlier step's effects when a later one exhausts.
        for (_, txn) in pending {
            txn.commit();
        }

        let fuse_request = self
            .fusion
            .observe(&pathway.name, composition.clone(), if success { FusionOutcome::Success } else { FusionOutcome::Failure })?;
        if let Some(_req) = fuse_request {
            self.attempt_fusion(&pathway.name, &composition).await;
        }

        Ok(PathwayResult { pathway_name: pathway.name.clone(), success, steps: outcomes, composition })
    }

    async fn attempt_fusion(&self, pathway_name: &str, composition: &[Digest]) {
        let mut sources = Vec::with_capacity(composition.len());
        for digest in composition {
            match self.registry.get(*digest) {
                Ok(allele) => sources.push(allele.source),
                Err(e) => {
                    tracing::warn!(pathway = %pathway_name, error = %e, "fusion composition source unavailable");
                    return;
                }
            }
        }
        let request = MutationRequest { composition_sources: Some(sources), ..Default::default() };
        match self.mutation.mutate_fusion(pathway_name, request).await {
            Ok(digest) => {
                if let Err(e) = self.fusion.install_fused_allele(pathway_name, digest) {
                    tracing::warn!(pathway = %pathway_name, error = %e, "failed to install fused allele");
                }
            }
            Err(e) => tracing::warn!(pathway = %pathway_name, error = %e, "fusion composition failed"),
        }
    }

    async fn invoke_locus(
        &self,
        step: &StepDecl,
        bound: &Value,
        ctx: &ExecutionContext<'_>,
        pending: &mut Vec<(usize, Transaction)>,
    ) -> Result<(Digest, Value)> {
        let (dominant, fallback) = self.phenotype.resolve_with_stack(&step.locus)?;
        let contract = ctx.contracts.locus(&step.locus);
        let risk = contract.as_ref().map(|c| c.risk).unwrap_or(RiskClass::None);
        let family = contract.as_ref().and_then(|c| c.family);
        let policy = sg_safety::policy_for(risk);
        let input_json = bound.render_json();
        let input_digest = Digest::of_source(&canonicalise(&input_json));

        let mut last_err: Option<String> = None;
        for digest in std::iter::once(dominant).chain(fallback) {
            let allele = self.registry.get(digest)?;
            let unit = self.loader.load(digest, &allele.source)?;

            let use_transaction = matches!(family, Some(Family::Configuration)) && policy.transaction;
            let (outcome, txn) = if use_transaction {
                let wrapped = TransactionalCapability::new(ctx.capability, ctx.capability_table);
                let result = unit.execute(&input_json, &wrapped, ctx.sandbox_deadline);
                (result, Some(wrapped.take_transaction()))
            } else {
                (unit.execute(&input_json, ctx.capability, ctx.sandbox_deadline), None)
            };

            match outcome {
                Ok(raw) => {
                    let parsed = Value::parse_json(&raw);
                    let valid = match (&parsed, &contract) {
                        (Ok(v), Some(c)) => validate_output(v, &c.gives),
                        (Ok(_), None) => true,
                        (Err(_), _) => false,
                    };
                    if valid {
                        let output = parsed.expect("validated above");
                        if reports_failure(&output) {
                            last_err = Some("allele reported success=false".to_string());
                            if let Some(txn) = txn {
                                if let Err(e) = txn.rollback(ctx.capability) {
                                    tracing::warn!(locus = %step.locus, error = %e, "rollback after reported failure left residue");
                                }
                            }
                            self.arena.record(&step.locus, digest, input_digest, Outcome::Fail)?;
                            continue;
                        }
                        let observation_id = self.arena.record(&step.locus, digest, input_digest, Outcome::Ok)?;
                        if let Some(txn) = txn {
                            if !txn.is_empty() {
                                pending.push((step.index, txn));
                            }
                        }
                        if let Some(c) = &contract {
                            if let Some(verify_ms) = c.verify_within_ms {
                                for feed in &c.feeds {
                                    ctx.scheduler.schedule_convergence(&step.locus, digest, observation_id, verify_ms as i64, feed);
                                    if policy.resilience_required {
                                        ctx.scheduler.schedule_resilience(&step.locus, digest, observation_id, verify_ms as i64, feed);
                                    }
                                }
                            }
                        }
                        return Ok((digest, output));
                    }
                    last_err = Some("output failed schema validation".to_string());
                    if let Some(txn) = txn {
                        if let Err(e) = txn.rollback(ctx.capability) {
                            tracing::warn!(locus = %step.locus, error = %e, "rollback after schema mismatch left residue");
                        }
                    }
                    self.arena.record(&step.locus, digest, input_digest, Outcome::Fail)?;
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    if let Some(txn) = txn {
                        if let Err(re) = txn.rollback(ctx.capability) {
                            tracing::warn!(locus = %step.locus, error = %re, "rollback after execution failure left residue");
                        }
                    }
                    self.arena.record(&step.locus, digest, input_digest, Outcome::Fail)?;
                }
            }
        }

        tracing::warn!(locus = %step.locus, last_error = ?last_err, "locus stack exhausted");
        Err(PathwayError::LocusExhausted { locus: step.locus.clone() })
    }

    fn bind_inputs(&self, step: &StepDecl, binding_ctx: &BindingContext<'_>, pathway_name: &str) -> Result<Value> {
        let mut map = std::collections::BTreeMap::new();
        for (name, expr) in &step.bindings {
            let value = binding_ctx
                .resolve(expr)
                .map_err(|detail| PathwayError::Binding { pathway: pathway_name.to_string(), step: step.index, detail })?;
            map.insert(name.clone(), value);
        }
        Ok(Value::Map(map))
    }

    /// Apply a step's failure policy (defaulting to rollback-all when the
    /// step declares none). Returns `true` if the caller must stop running
    /// further steps.
    async fn apply_failure_policy(
        &self,
        step: &StepDecl,
        pending: &mut Vec<(usize, Transaction)>,
        ctx: &ExecutionContext<'_>,
        all_steps: &[StepDecl],
        skip: &mut HashSet<usize>,
    ) -> Result<bool> {
        let policy = step.on_failure.unwrap_or(sg_types::FailurePolicy::RollbackAll);
        match policy {
            sg_types::FailurePolicy::RollbackAll => {
                let drained: Vec<_> = std::mem::take(pending);
                for (idx, txn) in drained.into_iter().rev() {
                    if let Err(e) = txn.rollback(ctx.capability) {
                        tracing::warn!(step = idx, error = %e, "rollback-all left a residual capability effect");
                    }
                }
                Ok(true)
            }
            sg_types::FailurePolicy::ReportPartial => {
                skip.extend(transitive_dependents(step.index, all_steps));
                Ok(false)
            }
        }
    }

    async fn trigger_exhaustion_mutation(&self, step: &StepDecl, bound: &Value, ctx: &ExecutionContext<'_>) {
        let risk = ctx.contracts.locus(&step.locus).map(|c| c.risk).unwrap_or(RiskClass::None);
        let request = MutationRequest { failing_input: Some(bound.render_json()), ..Default::default() };
        if let Err(e) = self.mutation.mutate_locus(&step.locus, Trigger::Exhausted, request, risk, None).await {
            tracing::warn!(locus = %step.locus, error = %e, "exhaustion-triggered mutation failed");
        }
    }

    /// Hand off mild regressions observed by the arena to the mutation
    /// orchestrator. Intended to be called periodically, right after
    /// `Arena::sweep_locus`, by whatever drives the process loop — the
    /// arena itself never calls out to mutation (spec.md §4.D keeps
    /// scoring and mutation as separate authorities).
    pub async fn handle_regressions(&self, locus: &str, ctx: &ExecutionContext<'_>) -> Result<()> {
        for event in self.arena.recent_regressions(locus) {
            if event.kind != sg_arena::RegressionKind::Mild {
                continue;
            }
            let key = (locus.to_string(), event.digest, event.recorded_at.as_millis());
            {
                let mut seen = self.handled_regressions.lock();
                if !seen.insert(key) {
                    continue;
                }
            }
            let risk = ctx.contracts.locus(locus).map(|c| c.risk).unwrap_or(RiskClass::None);
            if let Err(e) = self
                .mutation
                .mutate_locus(locus, Trigger::Regression, MutationRequest::default(), risk, Some(event.digest))
                .await
            {
                tracing::warn!(locus = %locus, error = %e, "regression-triggered mutation failed");
            }
        }
        Ok(())
    }
}

fn transitive_dependents(idx: usize, steps: &[StepDecl]) -> HashSet<usize> {
    let dependents = direct_dependents(steps);
    let mut seen = HashSet::new();
    let mut stack = vec![idx];
    while let Some(current) = stack.pop() {
        if let Some(children) = dependents.get(&current) {
            for &child in children {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
    }
    seen
}

/// A schema-valid output can still be an immediate failure report: spec.md
/// §3's "immediate" fitness signal is the gene's own `success` field, not
/// just clean execution (§8 scenario 2: a seed allele that runs cleanly but
/// returns `{"success": false}` must still be scored a failure).
fn reports_failure(output: &Value) -> bool {
    matches!(output.get_field("success"), Some(Value::Bool(false)))
}

fn validate_output(output: &Value, gives: &[Param]) -> bool {
    for param in gives {
        if param.optional {
            continue;
        }
        match output.get_field(&param.name) {
            Some(value) => {
                if !scalar_type_matches(value, param) {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

fn scalar_type_matches(value: &Value, param: &Param) -> bool {
    if param.is_list {
        match value {
            Value::List(items) => items.iter().all(|v| scalar_matches_one(v, param.ty)),
            _ => false,
        }
    } else {
        scalar_matches_one(value, param.ty)
    }
}

fn scalar_matches_one(value: &Value, ty: ScalarType) -> bool {
    match ty {
        ScalarType::String => matches!(value, Value::Str(_)),
        ScalarType::Bool => matches!(value, Value::Bool(_)),
        ScalarType::Int => matches!(value, Value::Int(_)),
        ScalarType::Float => matches!(value, Value::Int(_) | Value::Float(_)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use sg_arena::{Arena, ArenaConfig, ManualClock};
    use sg_fusion::{FusionTracker, DEFAULT_FUSION_THRESHOLD};
    use sg_mutation::{MutationEngine, MutationOrchestrator, PromptDocument};
    use sg_registry::MutationContext;
    use sg_sandbox::{Loader, NullCapability};
    use sg_types::{Clock, FailurePolicy, Timestamp};

    struct EchoEngine;

    #[async_trait]
    impl MutationEngine for EchoEngine {
        async fn generate(&self, _prompt: &PromptDocument) -> std::result::Result<String, String> {
            Ok(r#"{"execute": {"op": "var", "name": "input"}}"#.to_string())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<Registry>,
        phenotype: Arc<PhenotypeMap>,
        loader: Arc<Loader>,
        executor: PathwayExecutor,
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());
        let phenotype = Arc::new(PhenotypeMap::open(dir.path(), registry.clone()).unwrap());
        let loader = Arc::new(Loader::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let arena = Arc::new(Arena::open(dir.path(), registry.clone(), phenotype.clone(), clock.clone(), ArenaConfig::default()).unwrap());
        let fusion = Arc::new(FusionTracker::open(dir.path(), phenotype.clone(), DEFAULT_FUSION_THRESHOLD).unwrap());
        let mutation = Arc::new(MutationOrchestrator::new(
            registry.clone(),
            phenotype.clone(),
            loader.clone(),
            Arc::new(EchoEngine),
            clock,
        ));
        let executor = PathwayExecutor::new(registry.clone(), phenotype.clone(), loader.clone(), arena, fusion, mutation);
        Fixture { _dir: dir, registry, phenotype, loader, executor }
    }

    fn put_and_seed(f: &Fixture, locus: &str, source: &str) -> Digest {
        let digest = f.registry.put(source, locus, None, MutationContext::default(), Timestamp::from_millis(0)).unwrap();
        f.phenotype.seed_dominant(locus, digest).unwrap();
        digest
    }

    fn vmap(pairs: &[(&str, Value)]) -> Value {
        Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<BTreeMap<_, _>>())
    }

    fn gene_contract(name: &str, risk: RiskClass, family: Family) -> Contract {
        Contract {
            name: name.to_string(),
            kind: ContractKind::Gene,
            family: Some(family),
            risk,
            does: "test gene".to_string(),
            takes: vec![],
            gives: vec![],
            before: None,
            after: None,
            fails_when: None,
            unhealthy_when: None,
            verify_within_ms: None,
            feeds: vec![],
            steps: vec![],
            requires: None,
        }
    }

    fn pathway_contract(name: &str, steps: Vec<StepDecl>) -> Contract {
        Contract {
            name: name.to_string(),
            kind: ContractKind::Pathway,
            family: None,
            risk: RiskClass::None,
            does: "test pathway".to_string(),
            takes: vec![],
            gives: vec![],
            before: None,
            after: None,
            fails_when: None,
            unhealthy_when: None,
            verify_within_ms: None,
            feeds: vec![],
            steps,
            requires: None,
        }
    }

    fn step(index: usize, locus: &str, needs: Vec<usize>, bindings: Vec<(&str, &str)>) -> StepDecl {
        StepDecl {
            index,
            locus: locus.to_string(),
            needs,
            bindings: bindings.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            iterate_over: None,
            guard: None,
            on_failure: None,
        }
    }

    fn basic_ctx<'a>(table: &'a CapabilityTable, contracts: &'a dyn ContractLookup, scheduler: &'a dyn VerificationScheduler) -> ExecutionContext<'a> {
        ExecutionContext {
            capability: &NullCapability,
            capability_table: table,
            contracts,
            scheduler,
            sandbox_deadline: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn single_step_pathway_succeeds() {
        let f = setup();
        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("echo", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract("p", vec![step(0, "echo", vec![], vec![("x", "{x}")])]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let input = vmap(&[("x", Value::Str("hi".to_string()))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn guarded_step_is_skipped_when_condition_false() {
        let f = setup();
        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("echo", RiskClass::None, Family::Diagnostic));
        let mut only_step = step(0, "echo", vec![], vec![("x", "{x}")]);
        only_step.guard = Some("{enabled} = true".to_string());
        let pathway = pathway_contract("p", vec![only_step]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let input = vmap(&[("enabled", Value::Bool(false)), ("x", Value::Str("hi".to_string()))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.steps[0].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn iteration_runs_step_once_per_item() {
        let f = setup();
        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("echo", RiskClass::None, Family::Diagnostic));
        let mut iter_step = step(0, "echo", vec![], vec![("n", "{item}")]);
        iter_step.iterate_over = Some("{items}".to_string());
        let pathway = pathway_contract("p", vec![iter_step]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let input = vmap(&[("items", Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(result.success);
        match &result.steps[0].output {
            Some(Value::List(items)) => assert_eq!(items.len(), 3),
            other => panic!("expected a list output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reported_failure_is_scored_a_failure_even_though_execution_succeeded() {
        let f = setup();
        let reports_false = r#"{"execute": {"op": "lit", "value": {"success": false}}}"#;
        let digest = put_and_seed(&f, "liar", reports_false);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("liar", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract("p", vec![step(0, "liar", vec![], vec![])]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let result = f.executor.run(&pathway, Value::Map(BTreeMap::new()), &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        let allele = f.registry.get(digest).unwrap();
        assert_eq!(allele.fitness.successes, 0);
        assert_eq!(allele.fitness.invocations, 1);
    }

    #[tokio::test]
    async fn exhaustion_mutation_carries_the_failing_input() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());
        let phenotype = Arc::new(PhenotypeMap::open(dir.path(), registry.clone()).unwrap());
        let loader = Arc::new(Loader::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let arena = Arc::new(Arena::open(dir.path(), registry.clone(), phenotype.clone(), clock.clone(), ArenaConfig::default()).unwrap());
        let fusion = Arc::new(FusionTracker::open(dir.path(), phenotype.clone(), DEFAULT_FUSION_THRESHOLD).unwrap());

        struct RecordingEngine {
            seen: StdMutex<Vec<Option<String>>>,
        }
        #[async_trait]
        impl MutationEngine for RecordingEngine {
            async fn generate(&self, prompt: &PromptDocument) -> std::result::Result<String, String> {
                self.seen.lock().unwrap().push(prompt.failing_input.clone());
                Ok(r#"{"execute": {"op": "var", "name": "input"}}"#.to_string())
            }
        }
        let engine = Arc::new(RecordingEngine { seen: StdMutex::new(Vec::new()) });
        let mutation = Arc::new(MutationOrchestrator::new(registry.clone(), phenotype.clone(), loader.clone(), engine.clone(), clock));
        let executor = PathwayExecutor::new(registry.clone(), phenotype.clone(), loader.clone(), arena, fusion, mutation);

        let always_fails = r#"{"execute": {"op": "cap", "name": "boom", "args": []}}"#;
        let digest = registry.put(always_fails, "flaky", None, MutationContext::default(), Timestamp::from_millis(0)).unwrap();
        phenotype.seed_dominant("flaky", digest).unwrap();
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("flaky", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract("p", vec![step(0, "flaky", vec![], vec![("x", "{x}")])]);

        struct AlwaysFails;
        impl Capability for AlwaysFails {
            fn call(&self, _operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                Err("boom".to_string())
            }
        }
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = ExecutionContext {
            capability: &AlwaysFails,
            capability_table: &table,
            contracts: &contracts,
            scheduler: &scheduler,
            sandbox_deadline: Duration::from_secs(1),
        };
        let input = vmap(&[("x", Value::Str("boom-input".to_string()))]);
        let result = executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(!result.success);

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let failing_input = seen[0].as_ref().expect("exhaustion mutation must carry the failing input");
        assert!(failing_input.contains("boom-input"));
    }

    #[tokio::test]
    async fn exhausted_locus_fails_the_step_and_triggers_mutation() {
        let f = setup();
        let always_fails = r#"{"execute": {"op": "cap", "name": "boom", "args": []}}"#;
        put_and_seed(&f, "flaky", always_fails);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("flaky", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract("p", vec![step(0, "flaky", vec![], vec![])]);

        struct AlwaysFails;
        impl Capability for AlwaysFails {
            fn call(&self, _operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                Err("boom".to_string())
            }
        }
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = ExecutionContext {
            capability: &AlwaysFails,
            capability_table: &table,
            contracts: &contracts,
            scheduler: &scheduler,
            sandbox_deadline: Duration::from_secs(1),
        };
        let result = f.executor.run(&pathway, Value::Map(BTreeMap::new()), &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        // mutation fires and joins the fallback stack since a dominant already exists
        let (_dominant, fallback) = f.phenotype.resolve_with_stack("flaky").unwrap();
        assert_eq!(fallback.len(), 1);
    }

    #[tokio::test]
    async fn rollback_all_undoes_a_prior_steps_transaction() {
        let f = setup();
        let setter = r#"{"execute": {"op": "block", "exprs": [
            {"op": "cap", "name": "set", "args": [{"op": "lit", "value": "k"}]},
            {"op": "lit", "value": {}}
        ]}}"#;
        let always_fails = r#"{"execute": {"op": "cap", "name": "boom", "args": []}}"#;
        put_and_seed(&f, "cfg", setter);
        put_and_seed(&f, "flaky", always_fails);

        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("cfg", RiskClass::Low, Family::Configuration));
        contracts.insert(gene_contract("flaky", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract(
            "p",
            vec![step(0, "cfg", vec![], vec![]), step(1, "flaky", vec![0], vec![])],
        );

        struct RecordingCapability {
            calls: StdMutex<Vec<String>>,
        }
        impl Capability for RecordingCapability {
            fn call(&self, operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                if operation == "boom" {
                    return Err("boom".to_string());
                }
                self.calls.lock().unwrap().push(operation.to_string());
                Ok(Value::Bool(true))
            }
        }
        let capability = RecordingCapability { calls: Default::default() };
        let mut table = CapabilityTable::new();
        table.register(
            "set",
            Box::new(|args: &[Value]| {
                let key = args.first()?.as_str()?.to_string();
                Some(("unset".to_string(), vec![Value::Str(key)]))
            }),
        );
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = ExecutionContext {
            capability: &capability,
            capability_table: &table,
            contracts: &contracts,
            scheduler: &scheduler,
            sandbox_deadline: Duration::from_secs(1),
        };
        let result = f.executor.run(&pathway, Value::Map(BTreeMap::new()), &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.steps[0].status, StepStatus::Succeeded);
        assert_eq!(result.steps[1].status, StepStatus::Failed);
        assert_eq!(capability.calls.lock().unwrap().as_slice(), ["set", "unset"]);
    }

    #[tokio::test]
    async fn report_partial_skips_only_dependent_steps() {
        let f = setup();
        let always_fails = r#"{"execute": {"op": "cap", "name": "boom", "args": []}}"#;
        put_and_seed(&f, "flaky", always_fails);
        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);

        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("flaky", RiskClass::None, Family::Diagnostic));
        contracts.insert(gene_contract("echo", RiskClass::None, Family::Diagnostic));

        let mut failing_step = step(0, "flaky", vec![], vec![]);
        failing_step.on_failure = Some(FailurePolicy::ReportPartial);
        let dependent_step = step(1, "echo", vec![0], vec![("x", "{step 0.anything}")]);
        let independent_step = step(2, "echo", vec![], vec![("x", "{x}")]);
        let pathway = pathway_contract("p", vec![failing_step, dependent_step, independent_step]);

        struct AlwaysFails;
        impl Capability for AlwaysFails {
            fn call(&self, _operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                Err("boom".to_string())
            }
        }
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = ExecutionContext {
            capability: &AlwaysFails,
            capability_table: &table,
            contracts: &contracts,
            scheduler: &scheduler,
            sandbox_deadline: Duration::from_secs(1),
        };
        let input = vmap(&[("x", Value::Str("hi".to_string()))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        assert_eq!(result.steps[1].status, StepStatus::Skipped);
        assert_eq!(result.steps[2].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn fused_allele_runs_as_a_single_gene_on_success() {
        let f = setup();
        let fused_source = r#"{"execute": {"op": "var", "name": "input"}}"#;
        let fused_digest = f.registry.put(fused_source, "p", None, MutationContext::default(), Timestamp::from_millis(0)).unwrap();
        f.phenotype.set_fusion("p", fused_digest).unwrap();
        let _ = f.loader.load(fused_digest, fused_source).unwrap();

        let contracts = crate::contracts::StaticContracts::new();
        let pathway = pathway_contract("p", vec![]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let input = vmap(&[("x", Value::Str("hi".to_string()))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.composition, vec![fused_digest]);
    }

    #[tokio::test]
    async fn fused_allele_failure_decomposes_and_falls_back_to_steps() {
        let f = setup();
        let fused_source = r#"{"execute": {"op": "cap", "name": "boom", "args": []}}"#;
        let fused_digest = f.registry.put(fused_source, "p", None, MutationContext::default(), Timestamp::from_millis(0)).unwrap();
        f.phenotype.set_fusion("p", fused_digest).unwrap();

        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);
        let mut contracts = crate::contracts::StaticContracts::new();
        contracts.insert(gene_contract("echo", RiskClass::None, Family::Diagnostic));
        let pathway = pathway_contract("p", vec![step(0, "echo", vec![], vec![("x", "{x}")])]);

        struct AlwaysFails;
        impl Capability for AlwaysFails {
            fn call(&self, _operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                Err("boom".to_string())
            }
        }
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = ExecutionContext {
            capability: &AlwaysFails,
            capability_table: &table,
            contracts: &contracts,
            scheduler: &scheduler,
            sandbox_deadline: Duration::from_secs(1),
        };
        let input = vmap(&[("x", Value::Str("hi".to_string()))]);
        let result = f.executor.run(&pathway, input, &ctx).await.unwrap();
        assert!(result.success);
        assert!(f.phenotype.pathway_state("p").fused_allele.is_none());
        assert_eq!(result.steps[0].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn plan_resolves_dominants_without_invoking_anything() {
        let f = setup();
        put_and_seed(&f, "echo", r#"{"execute": {"op": "var", "name": "input"}}"#);
        let contracts = crate::contracts::StaticContracts::new();
        let pathway = pathway_contract("p", vec![step(0, "echo", vec![], vec![("x", "{x}")])]);
        let table = CapabilityTable::new();
        let scheduler = crate::scheduler::NullScheduler;
        let ctx = basic_ctx(&table, &contracts, &scheduler);
        let result = f.executor.plan(&pathway, &ctx).unwrap();
        assert_eq!(result.steps[0].status, StepStatus::Planned);
        assert!(result.steps[0].digest.is_some());
    }
}
