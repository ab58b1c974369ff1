//! Component B: the phenotype map — per-locus dominant/fallback selection
//! and per-pathway fusion state, persisted to `phenotype.toml`.

mod doc;
pub mod error;
mod map;

pub use doc::FusionRecord;
pub use error::{PhenotypeError, Result};
pub use map::PhenotypeMap;
