//! The allele record (spec §3) and its lightweight, persisted fitness
//! summary. The full per-invocation observation ring lives in `sg-arena`;
//! what the registry stores in `index.json` is the scalar derived from it,
//! following the `fitness_summary` field named in spec.md §6's on-disk
//! layout.

use serde::{Deserialize, Serialize};
use sg_types::{Digest, Timestamp};
use std::collections::BTreeMap;

/// Lifecycle state of an allele, spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Shadow,
    Canary,
    Recessive,
    Dominant,
    Deprecated,
}

impl LifecycleState {
    pub fn is_living(&self) -> bool {
        !matches!(self, LifecycleState::Deprecated)
    }
}

/// Where an allele came from: a failing input, the error it produced, and a
/// free-form diagnostic snapshot captured at mutation time. `None` for seed
/// alleles created directly (not via the mutation engine).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationContext {
    pub failing_input_digest: Option<Digest>,
    pub error_summary: Option<String>,
    pub diagnostics: BTreeMap<String, String>,
}

/// Persisted scalar fitness summary, recomputed by `sg-arena` after every
/// observation and written through via [`crate::Registry::update_fitness`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessSummary {
    pub invocations: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub fitness: f64,
}

impl Default for FitnessSummary {
    fn default() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            consecutive_failures: 0,
            fitness: 0.0,
        }
    }
}

/// An immutable allele record: one implementation of a locus, keyed by the
/// digest of its canonicalised source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allele {
    pub digest: Digest,
    pub locus: String,
    pub generation: u32,
    pub parent: Option<Digest>,
    pub created_at: Timestamp,
    pub mutation_ctx: MutationContext,
    pub state: LifecycleState,
    pub fitness: FitnessSummary,
    /// The allele's canonicalised source text. Kept alongside the record in
    /// memory for convenience; persisted separately as `<digest>.src`.
    #[serde(skip)]
    pub source: String,
}

impl Allele {
    pub fn new(
        digest: Digest,
        source: String,
        locus: impl Into<String>,
        generation: u32,
        parent: Option<Digest>,
        created_at: Timestamp,
        mutation_ctx: MutationContext,
        state: LifecycleState,
    ) -> Self {
        Self {
            digest,
            locus: locus.into(),
            generation,
            parent,
            created_at,
            mutation_ctx,
            state,
            fitness: FitnessSummary::default(),
            source,
        }
    }
}

/// The subset of [`Allele`] that is persisted verbatim in `index.json`;
/// `source` is omitted (it lives in the per-digest `.src` file) and
/// `digest` is the map key rather than a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub locus: String,
    pub generation: u32,
    pub parent: Option<Digest>,
    pub created_at: Timestamp,
    pub mutation_ctx: MutationContext,
    pub state: LifecycleState,
    pub fitness: FitnessSummary,
}

impl IndexEntry {
    pub fn from_allele(allele: &Allele) -> Self {
        Self {
            locus: allele.locus.clone(),
            generation: allele.generation,
            parent: allele.parent,
            created_at: allele.created_at,
            mutation_ctx: allele.mutation_ctx.clone(),
            state: allele.state,
            fitness: allele.fitness,
        }
    }

    pub fn into_allele(self, digest: Digest, source: String) -> Allele {
        Allele {
            digest,
            locus: self.locus,
            generation: self.generation,
            parent: self.parent,
            created_at: self.created_at,
            mutation_ctx: self.mutation_ctx,
            state: self.state,
            fitness: self.fitness,
            source,
        }
    }
}
