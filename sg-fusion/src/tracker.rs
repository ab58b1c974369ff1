//! Component G: the fusion tracker, spec.md §4.G. Watches a pathway's
//! composition (the sequence of digests its steps resolved to) across
//! consecutive successful runs and, once the identical composition has won
//! the fusion threshold number of times in a row, asks (H) to fuse it into
//! a single allele. A later run's failure decomposes a fused pathway back
//! to its constituent steps — the constituents remain in the registry
//! (append-only), so decomposition is always safe.
//!
//! No teacher file tracks a consecutive-identical-composition streak; the
//! state machine here is new domain logic, built in the same small-struct-
//! plus-enum, `Serialize`/`Deserialize`, no-unwraps idiom `sg-phenotype`
//! uses for `phenotype.toml`, distilled from `housaky-evolution::selection`'s
//! aggregate-over-history style (`PopulationStats`).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sg_phenotype::PhenotypeMap;
use sg_types::Digest;

use crate::error::Result;

const FUSION_TRACKER_FILE: &str = "fusion_tracker.json";
/// Consecutive identical-composition successes required to fuse. The
/// request fires on the run that makes the count reach this value, i.e. the
/// 10th success, not the 9th.
pub const DEFAULT_FUSION_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    Success,
    Failure,
}

/// Tracked state for one pathway, spec.md §4.G's `FusionState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FusionState {
    pub composition: Vec<Digest>,
    pub consecutive_successes: u64,
    pub fused_allele: Option<Digest>,
}

/// Emitted when a composition's streak crosses the fusion threshold with no
/// fused allele yet installed. Fulfilled asynchronously by (H); the
/// resulting digest is installed via [`FusionTracker::install_fused_allele`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseRequest {
    pub pathway_name: String,
    pub composition: Vec<Digest>,
}

#[derive(Default, Serialize, Deserialize)]
struct FusionDoc {
    by_pathway: BTreeMap<String, FusionState>,
}

pub struct FusionTracker {
    root: PathBuf,
    phenotype: Arc<PhenotypeMap>,
    threshold: u64,
    doc: RwLock<FusionDoc>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl FusionTracker {
    pub fn open(root: impl AsRef<Path>, phenotype: Arc<PhenotypeMap>, threshold: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let doc = Self::load(&root).map_err(crate::error::FusionError::Io)?;
        Ok(Self {
            root,
            phenotype,
            threshold,
            doc: RwLock::new(doc),
            locks: RwLock::new(HashMap::new()),
        })
    }

    fn load(root: &Path) -> anyhow::Result<FusionDoc> {
        let path = root.join(FUSION_TRACKER_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(doc) => Ok(doc),
                Err(e) => {
                    tracing::warn!(error = %e, "fusion tracker file corrupt, starting empty");
                    Ok(FusionDoc::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FusionDoc::default()),
            Err(e) => Err(e).context("reading fusion tracker file"),
        }
    }

    fn persist(&self) -> Result<()> {
        let json = {
            let doc = self.doc.read();
            serde_json::to_vec_pretty(&*doc).context("serialising fusion tracker").map_err(crate::error::FusionError::Io)?
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .with_context(|| format!("creating temp file in {}", self.root.display()))
            .map_err(crate::error::FusionError::Io)?;
        tmp.write_all(&json).context("writing temp file").map_err(crate::error::FusionError::Io)?;
        tmp.flush().context("flushing temp file").map_err(crate::error::FusionError::Io)?;
        let target = self.root.join(FUSION_TRACKER_FILE);
        tmp.persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("renaming temp file into place at {}", target.display()))
            .map_err(crate::error::FusionError::Io)?;
        Ok(())
    }

    fn pathway_lock(&self, pathway_name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(pathway_name) {
            return lock.clone();
        }
        self.locks
            .write()
            .entry(pathway_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn state(&self, pathway_name: &str) -> FusionState {
        self.doc.read().by_pathway.get(pathway_name).cloned().unwrap_or_default()
    }

    /// Record one pathway run's outcome and composition. Returns a
    /// [`FuseRequest`] the caller must hand to (H) when the composition's
    /// streak just crossed the fusion threshold.
    pub fn observe(
        &self,
        pathway_name: &str,
        composition: Vec<Digest>,
        outcome: FusionOutcome,
    ) -> Result<Option<FuseRequest>> {
        let lock = self.pathway_lock(pathway_name);
        let _guard = lock.lock();

        let mut request = None;
        let mut decomposed = false;
        {
            let mut doc = self.doc.write();
            let entry = doc.by_pathway.entry(pathway_name.to_string()).or_default();

            match outcome {
                FusionOutcome::Success => {
                    if entry.composition == composition {
                        entry.consecutive_successes += 1;
                    } else {
                        entry.composition = composition.clone();
                        entry.consecutive_successes = 1;
                    }
                    if entry.consecutive_successes >= self.threshold && entry.fused_allele.is_none() {
                        request = Some(FuseRequest {
                            pathway_name: pathway_name.to_string(),
                            composition: entry.composition.clone(),
                        });
                    }
                }
                FusionOutcome::Failure => {
                    if entry.fused_allele.take().is_some() {
                        tracing::info!(pathway_name, "decomposing fused pathway on failure");
                        decomposed = true;
                    }
                    entry.consecutive_successes = 0;
                }
            }
        }

        self.persist()?;
        if decomposed {
            self.phenotype.clear_fusion(pathway_name)?;
        }
        let (composition, count) = {
            let doc = self.doc.read();
            let entry = doc.by_pathway.get(pathway_name).cloned().unwrap_or_default();
            (entry.composition, entry.consecutive_successes)
        };
        self.phenotype.set_reinforcement(pathway_name, composition, count)?;

        Ok(request)
    }

    /// Install the digest (H) produced in response to a prior [`FuseRequest`]
    /// as the fused allele for `pathway_name`, bypassing the normal
    /// phenotype entry (spec.md §4.H).
    pub fn install_fused_allele(&self, pathway_name: &str, digest: Digest) -> Result<()> {
        let lock = self.pathway_lock(pathway_name);
        let _guard = lock.lock();
        {
            let mut doc = self.doc.write();
            let entry = doc.by_pathway.entry(pathway_name.to_string()).or_default();
            entry.fused_allele = Some(digest);
        }
        self.persist()?;
        self.phenotype.set_fusion(pathway_name, digest)?;
        Ok(())
    }
}
