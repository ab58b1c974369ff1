//! The serializable shape of `phenotype.toml`: one table per locus, one
//! table per pathway, per spec.md §6's on-disk layout.

use serde::{Deserialize, Serialize};
use sg_types::Digest;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LocusEntry {
    pub dominant: Option<Digest>,
    #[serde(default)]
    pub fallback: Vec<Digest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PathwayEntry {
    #[serde(default)]
    pub fused_allele: Option<Digest>,
    #[serde(default)]
    pub reinforcement_count: u64,
    #[serde(default)]
    pub last_composition: Vec<Digest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PhenotypeDoc {
    #[serde(default)]
    pub loci: BTreeMap<String, LocusEntry>,
    #[serde(default)]
    pub pathways: BTreeMap<String, PathwayEntry>,
}

/// Public, read-only view of a pathway's fusion state, returned by
/// `PhenotypeMap::pathway_state`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionRecord {
    pub fused_allele: Option<Digest>,
    pub reinforcement_count: u64,
    pub last_composition: Vec<Digest>,
}

impl From<&PathwayEntry> for FusionRecord {
    fn from(e: &PathwayEntry) -> Self {
        Self {
            fused_allele: e.fused_allele,
            reinforcement_count: e.reinforcement_count,
            last_composition: e.last_composition.clone(),
        }
    }
}
