use sg_types::SgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("mutation engine failed for locus {locus:?}: {detail}")]
    EngineFailure { locus: String, detail: String },
    #[error(transparent)]
    Registry(#[from] sg_registry::RegistryError),
    #[error(transparent)]
    Phenotype(#[from] sg_phenotype::PhenotypeError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<MutationError> for SgError {
    fn from(e: MutationError) -> Self {
        match e {
            MutationError::EngineFailure { locus, detail } => SgError::MutationEngineFailure { locus, detail },
            MutationError::Registry(e) => e.into(),
            MutationError::Phenotype(e) => e.into(),
            MutationError::Io(e) => SgError::RegistryCorrupt { detail: format!("{e:#}") },
        }
    }
}

pub type Result<T> = std::result::Result<T, MutationError>;
