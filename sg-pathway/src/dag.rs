//! Step DAG construction, spec.md §4.F step 2: explicit `needs` edges plus
//! implicit edges inferred from every `{step N...}` reference in a step's
//! bindings, guard, and iteration source. Topologically ordered with
//! Kahn's algorithm; ties break on ascending step index for a deterministic,
//! reproducible run order (the core only promises sequential execution
//! within a layer is order-independent, never that it is random).

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;
use sg_types::StepDecl;

fn step_ref_pattern() -> Regex {
    Regex::new(r"step\s+(\d+)").expect("static step-reference pattern is valid")
}

/// Extract every `step N` reference inside a raw expression string.
pub(crate) fn extract_step_refs(expr: &str, out: &mut HashSet<usize>) {
    for cap in step_ref_pattern().captures_iter(expr) {
        if let Ok(n) = cap[1].parse::<usize>() {
            out.insert(n);
        }
    }
}

fn direct_dependencies(step: &StepDecl) -> HashSet<usize> {
    let mut deps: HashSet<usize> = step.needs.iter().copied().collect();
    for (_, expr) in &step.bindings {
        extract_step_refs(expr, &mut deps);
    }
    if let Some(expr) = &step.iterate_over {
        extract_step_refs(expr, &mut deps);
    }
    if let Some(expr) = &step.guard {
        extract_step_refs(expr, &mut deps);
    }
    deps.remove(&step.index);
    deps
}

/// Direct dependents of every step index: `dependents[i]` lists the steps
/// whose dependency set contains `i`. Shared by [`topo_order`] and the
/// executor's report-partial downstream-skip computation.
pub(crate) fn direct_dependents(steps: &[StepDecl]) -> HashMap<usize, Vec<usize>> {
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    for step in steps {
        for dep in direct_dependencies(step) {
            dependents.entry(dep).or_default().push(step.index);
        }
    }
    dependents
}

/// Topologically order `steps` by declared `index`. Returns an error string
/// (wrapped as a `BindingError` by the caller) if the dependency graph
/// contains a cycle — ruled out by the data model but not by a corrupt or
/// hand-edited contract.
pub fn topo_order(steps: &[StepDecl]) -> Result<Vec<usize>, String> {
    let mut indegree: HashMap<usize, usize> = HashMap::new();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    for step in steps {
        indegree.entry(step.index).or_insert(0);
        dependents.entry(step.index).or_default();
    }
    for step in steps {
        let deps = direct_dependencies(step);
        *indegree.entry(step.index).or_insert(0) = deps.len();
        for dep in deps {
            dependents.entry(dep).or_default().push(step.index);
        }
    }

    let mut ready: BTreeSet<usize> = indegree.iter().filter(|(_, d)| **d == 0).map(|(i, _)| *i).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        if let Some(children) = dependents.get(&next) {
            for &child in children {
                let entry = indegree.get_mut(&child).expect("child present in indegree map");
                *entry -= 1;
                if *entry == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    if order.len() != steps.len() {
        return Err("pathway step graph contains a cycle".to_string());
    }
    Ok(order)
}
