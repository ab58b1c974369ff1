use sg_types::SgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Registry(#[from] sg_registry::RegistryError),
    #[error(transparent)]
    Phenotype(#[from] sg_phenotype::PhenotypeError),
    #[error(transparent)]
    Arena(#[from] sg_arena::ArenaError),
    #[error(transparent)]
    Fusion(#[from] sg_fusion::FusionError),
    #[error(transparent)]
    Pathway(#[from] sg_pathway::PathwayError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<RuntimeError> for SgError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Registry(e) => e.into(),
            RuntimeError::Phenotype(e) => e.into(),
            RuntimeError::Arena(e) => e.into(),
            RuntimeError::Fusion(e) => e.into(),
            RuntimeError::Pathway(e) => e.into(),
            RuntimeError::Io(e) => SgError::RegistryCorrupt { detail: format!("{e:#}") },
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
