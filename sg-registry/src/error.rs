use sg_types::{Digest, SgError};
use thiserror::Error;

/// Local failure modes of the registry, before being mapped to [`SgError`]
/// at the crate boundary.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("allele {0} not found")]
    NotFound(Digest),

    #[error("index corrupt and could not be rebuilt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<RegistryError> for SgError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(digest) => SgError::RegistryCorrupt {
                detail: format!("referenced allele {digest} missing from registry"),
            },
            RegistryError::Corrupt(detail) => SgError::RegistryCorrupt { detail },
            RegistryError::Io(e) => SgError::RegistryCorrupt {
                detail: format!("{e:#}"),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
