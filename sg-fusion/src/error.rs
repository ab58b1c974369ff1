use sg_types::SgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FusionError {
    #[error(transparent)]
    Phenotype(#[from] sg_phenotype::PhenotypeError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<FusionError> for SgError {
    fn from(e: FusionError) -> Self {
        match e {
            FusionError::Phenotype(e) => e.into(),
            FusionError::Io(e) => SgError::RegistryCorrupt { detail: format!("{e:#}") },
        }
    }
}

pub type Result<T> = std::result::Result<T, FusionError>;
