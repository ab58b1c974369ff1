use sg_types::{Digest, SgError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhenotypeError {
    #[error("locus {0:?} has no phenotype entry")]
    UnknownLocus(String),

    #[error("pathway {0:?} has no fusion record")]
    UnknownPathway(String),

    #[error("locus {0:?} is exhausted: fallback stack empty and no seed available")]
    LocusExhausted(String),

    #[error("digest {digest} is not present in the registry")]
    DanglingDigest { digest: Digest },

    #[error(transparent)]
    Registry(#[from] sg_registry::RegistryError),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<PhenotypeError> for SgError {
    fn from(err: PhenotypeError) -> Self {
        match err {
            PhenotypeError::LocusExhausted(locus) => SgError::LocusExhausted { locus },
            PhenotypeError::UnknownLocus(locus) => SgError::LocusExhausted { locus },
            other => SgError::RegistryCorrupt {
                detail: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PhenotypeError>;
