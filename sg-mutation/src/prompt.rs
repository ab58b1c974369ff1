//! The mutation request/prompt shapes, spec.md §4.H. `sg-mutation` never
//! interprets any of this text; it is assembled here and handed opaquely to
//! whatever implements [`MutationEngine`], mirroring the way
//! `housaky-evolution::dgm`'s `ImprovementProposal` carries free-text
//! rationale the orchestrator never parses.

use async_trait::async_trait;
use sg_types::Digest;

/// Why a mutation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every allele in the locus's stack has failed.
    Exhausted,
    /// `sg-arena` reported a mild regression.
    Regression,
    /// A pathway composition crossed the fusion threshold.
    Fusion,
    /// Caller-initiated, no triggering failure.
    Proactive,
}

/// The caller-supplied context for one `mutate` call, spec.md §4.H's
/// `context` argument.
#[derive(Debug, Clone, Default)]
pub struct MutationRequest {
    /// Free-text behavioural description from the locus's contract, passed
    /// through verbatim; `None` if the caller has no parsed contract handy.
    pub contract_does: Option<String>,
    /// The input that produced the failing invocation (trigger `exhausted`).
    pub failing_input: Option<String>,
    /// The allele whose failure (or regression) triggered this mutation.
    pub offending_digest: Option<Digest>,
    /// The offending allele's source, for the engine to read and improve on.
    pub failing_source: Option<String>,
    pub error_summary: Option<String>,
    /// Free-text diagnostic observations (feeding loci) relevant to the
    /// failure, opaque to this crate.
    pub diagnostic_observations: Vec<String>,
    /// Constituent allele sources to combine, for trigger `fusion` only.
    pub composition_sources: Option<Vec<String>>,
}

/// The document handed to [`MutationEngine::generate`]. Built from a
/// [`MutationRequest`] plus the locus/pathway name and trigger; the engine
/// treats every field as opaque text.
#[derive(Debug, Clone)]
pub struct PromptDocument {
    pub locus: String,
    pub trigger: Trigger,
    pub contract_does: Option<String>,
    pub failing_input: Option<String>,
    pub failing_source: Option<String>,
    pub error_summary: Option<String>,
    pub diagnostic_observations: Vec<String>,
    pub composition_sources: Option<Vec<String>>,
}

impl PromptDocument {
    pub fn build(locus: &str, trigger: Trigger, request: &MutationRequest) -> Self {
        Self {
            locus: locus.to_string(),
            trigger,
            contract_does: request.contract_does.clone(),
            failing_input: request.failing_input.clone(),
            failing_source: request.failing_source.clone(),
            error_summary: request.error_summary.clone(),
            diagnostic_observations: request.diagnostic_observations.clone(),
            composition_sources: request.composition_sources.clone(),
        }
    }
}

/// The opaque external engine: receives a [`PromptDocument`] and returns new
/// allele source text, or an error string if it could not produce one.
/// `sg-mutation` never inspects how the engine arrives at its answer —
/// it calls it, receives text, computes the digest, stores via `sg-registry`.
#[async_trait]
pub trait MutationEngine: Send + Sync {
    async fn generate(&self, prompt: &PromptDocument) -> std::result::Result<String, String>;
}
