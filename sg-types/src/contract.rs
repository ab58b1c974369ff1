//! The opaque parsed contract value of spec §6.
//!
//! A contract is the declarative header attached to every allele and every
//! pathway: `name`, `kind`, `risk`, and (for genes) a `does`/`takes`/`gives`
//! behavioural surface; (for pathways) a `steps` surface. The runtime never
//! inspects or type-checks the meaning of `does`, `fails_when`, and
//! `unhealthy_when` beyond parsing them into this shape — they are passed
//! through to sandboxed evaluation and to the mutation engine prompt as
//! opaque text, following `housaky-evolution`'s treatment of its genome
//! metadata as data rather than as something the orchestrator interprets.

use serde::{Deserialize, Serialize};

/// Whether a contract names a gene, a pathway, or a topology (a pathway of
/// pathways).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Gene,
    Pathway,
    Topology,
}

/// `configuration` genes mutate the host's observable state and therefore
/// run behind a transaction; `diagnostic` genes are read-only and never
/// need an undo log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Configuration,
    Diagnostic,
}

/// Blast radius class, driving the safety policy table in `sg-safety`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// A scalar type as it appears in a `takes`/`gives` parameter declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Bool,
    Int,
    Float,
}

/// A single declared parameter: `name: type[]?` in contract source, where
/// `[]` marks a list and `?` marks optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: ScalarType,
    pub is_list: bool,
    pub optional: bool,
}

/// What a pathway step does when the bound locus's whole fallback stack is
/// exhausted without a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    RollbackAll,
    ReportPartial,
}

/// A single declared step inside a pathway contract's `steps` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecl {
    pub index: usize,
    pub locus: String,
    /// Explicit `needs` edges, by step index.
    #[serde(default)]
    pub needs: Vec<usize>,
    /// Raw binding expression text for each input, e.g. `"{step 1.path}"`.
    #[serde(default)]
    pub bindings: Vec<(String, String)>,
    /// Raw iteration source expression, if this step is a `for v in {expr}`.
    #[serde(default)]
    pub iterate_over: Option<String>,
    /// Raw guard expression text, if this step is conditional.
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub on_failure: Option<FailurePolicy>,
}

/// The parsed contract header attached to an allele or a pathway. Construct
/// via [`Contract::parse`]; the runtime never builds one by hand outside of
/// tests and the registry's `put` path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub kind: ContractKind,
    pub family: Option<Family>,
    pub risk: RiskClass,
    /// Free-text behavioural description, passed to the mutation engine
    /// verbatim and otherwise treated as opaque.
    pub does: String,
    pub takes: Vec<Param>,
    pub gives: Vec<Param>,
    /// Free-text pre/postcondition prose, opaque to the runtime.
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    /// Opaque predicate text classifying a result as an immediate failure.
    #[serde(default)]
    pub fails_when: Option<String>,
    /// Opaque predicate text classifying a result as unhealthy under
    /// convergence/resilience observation.
    #[serde(default)]
    pub unhealthy_when: Option<String>,
    /// How long after invocation a convergence/resilience observation
    /// should be attempted, in milliseconds; `None` means the locus has no
    /// delayed verification.
    #[serde(default)]
    pub verify_within_ms: Option<u64>,
    /// Downstream loci this allele's output commonly feeds, used by the
    /// pathway planner's implicit-edge inference as a hint only.
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Present only on pathway/topology contracts.
    #[serde(default)]
    pub steps: Vec<StepDecl>,
    /// Pathway-level precondition text, opaque.
    #[serde(default)]
    pub requires: Option<String>,
}

/// Error parsing a raw contract block into a [`Contract`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContractParseError {
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("malformed parameter declaration: {0:?}")]
    BadParam(String),
    #[error("contract is not valid JSON: {0}")]
    Json(String),
}

impl Contract {
    /// Parse a contract from its JSON wire form (the form alleles and
    /// pathway documents are stored in on disk). Structural validation
    /// only — `does`/`fails_when`/etc. are not interpreted here.
    pub fn parse(raw: &str) -> Result<Self, ContractParseError> {
        serde_json::from_str(raw).map_err(|e| ContractParseError::Json(e.to_string()))
    }
}
