//! Component A: the content-addressed allele registry.
//!
//! An append-only store of allele source keyed by the SHA-256 digest of its
//! canonicalised text, plus the metadata spec.md §3 attaches to an allele:
//! locus, lineage, lifecycle state, and a persisted fitness summary.

pub mod allele;
pub mod error;
mod store;

pub use allele::{Allele, FitnessSummary, LifecycleState, MutationContext};
pub use error::{RegistryError, Result};
pub use store::Registry;
