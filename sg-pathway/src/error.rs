use sg_types::SgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathwayError {
    /// A binding/guard/iteration expression referenced a name that does not
    /// exist, or every allele for a step's locus has failed. Both are fatal
    /// for the pathway run (spec.md §4.F, §7).
    #[error("pathway {pathway:?} step {step}: {detail}")]
    Binding {
        pathway: String,
        step: usize,
        detail: String,
    },
    #[error("locus {locus:?} is exhausted: every allele in its stack has failed")]
    LocusExhausted { locus: String },
    #[error(transparent)]
    Registry(#[from] sg_registry::RegistryError),
    #[error(transparent)]
    Phenotype(#[from] sg_phenotype::PhenotypeError),
    #[error(transparent)]
    Sandbox(#[from] sg_sandbox::SandboxError),
    #[error(transparent)]
    Safety(#[from] sg_safety::SafetyError),
    #[error(transparent)]
    Arena(#[from] sg_arena::ArenaError),
    #[error(transparent)]
    Fusion(#[from] sg_fusion::FusionError),
    #[error(transparent)]
    Mutation(#[from] sg_mutation::MutationError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<PathwayError> for SgError {
    fn from(e: PathwayError) -> Self {
        match e {
            PathwayError::Binding { pathway, step, detail } => SgError::BindingError { pathway, step, detail },
            PathwayError::LocusExhausted { locus } => SgError::LocusExhausted { locus },
            PathwayError::Registry(e) => e.into(),
            PathwayError::Phenotype(e) => e.into(),
            PathwayError::Sandbox(e) => e.into(),
            PathwayError::Safety(e) => e.into(),
            PathwayError::Arena(e) => e.into(),
            PathwayError::Fusion(e) => e.into(),
            PathwayError::Mutation(e) => e.into(),
            PathwayError::Io(e) => SgError::RegistryCorrupt { detail: format!("{e:#}") },
        }
    }
}

pub type Result<T> = std::result::Result<T, PathwayError>;
