//! Typed failure modes for the arena, following the crate-boundary
//! conversion pattern used throughout this workspace (anyhow internally,
//! a thiserror enum at the boundary, `From<ArenaError> for SgError`).

use sg_types::{Digest, SgError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("unknown observation {0} for digest {1}")]
    UnknownObservation(u64, Digest),
    #[error("locus exhausted: {0}")]
    LocusExhausted(String),
    #[error(transparent)]
    Registry(#[from] sg_registry::RegistryError),
    #[error(transparent)]
    Phenotype(#[from] sg_phenotype::PhenotypeError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<ArenaError> for SgError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::LocusExhausted(locus) => SgError::LocusExhausted { locus },
            ArenaError::Registry(e) => e.into(),
            ArenaError::Phenotype(e) => e.into(),
            other => SgError::RegistryCorrupt { detail: other.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, ArenaError>;
