use sg_sandbox::Value;
use sg_types::Digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Planned,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub index: usize,
    pub locus: String,
    pub status: StepStatus,
    pub digest: Option<Digest>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PathwayResult {
    pub pathway_name: String,
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    /// Every allele digest actually invoked this run, in invocation order —
    /// what the fusion tracker compares across runs for streak-matching.
    pub composition: Vec<Digest>,
}
