//! Component B: per-locus dominant/fallback resolution and per-pathway
//! fusion state, backed by `phenotype.toml`.
//!
//! No teacher file performs locus selection directly; the single-writer,
//! snapshot-reader discipline is grounded in `housaky-core::orchestrator`'s
//! `Arc<RwLock<..>>` shared-state idiom (there: `tokio::sync::RwLock` around
//! subsystem handles; here: `parking_lot::RwLock` around one document, since
//! phenotype reads/writes are synchronous and local, matching spec.md §5's
//! "readers lock-free against snapshots").

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use parking_lot::RwLock;
use sg_registry::{LifecycleState, Registry};
use sg_types::Digest;
use tracing::{debug, warn};

use crate::doc::{FusionRecord, PathwayEntry, PhenotypeDoc};
use crate::error::{PhenotypeError, Result};

const PHENOTYPE_FILE: &str = "phenotype.toml";

pub struct PhenotypeMap {
    path: PathBuf,
    registry: Arc<Registry>,
    doc: RwLock<PhenotypeDoc>,
}

impl PhenotypeMap {
    /// Open (or initialise empty) the phenotype document at
    /// `<root>/phenotype.toml`.
    pub fn open(root: impl AsRef<Path>, registry: Arc<Registry>) -> Result<Self> {
        let path = root.as_ref().join(PHENOTYPE_FILE);
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "phenotype.toml corrupt, starting empty");
                PhenotypeDoc::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PhenotypeDoc::default(),
            Err(e) => return Err(PhenotypeError::Io(anyhow::Error::new(e))),
        };
        let map = Self {
            path,
            registry,
            doc: RwLock::new(doc),
        };
        map.persist()?;
        Ok(map)
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read();
        let rendered = toml::to_string_pretty(&*doc)
            .context("serialising phenotype.toml")
            .map_err(PhenotypeError::Io)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(PHENOTYPE_FILE);
        write_atomic(dir, name, rendered.as_bytes()).map_err(PhenotypeError::Io)
    }

    /// Give `locus` a dominant allele where none exists yet. Used by the
    /// runtime's bootstrap of seed alleles; no-op if already seeded.
    pub fn seed_dominant(&self, locus: &str, digest: Digest) -> Result<()> {
        {
            let mut doc = self.doc.write();
            let entry = doc.loci.entry(locus.to_string()).or_default();
            if entry.dominant.is_none() {
                entry.dominant = Some(digest);
            }
        }
        self.registry.set_state(digest, LifecycleState::Dominant)?;
        self.persist()
    }

    pub fn resolve(&self, locus: &str) -> Result<Digest> {
        let doc = self.doc.read();
        let entry = doc
            .loci
            .get(locus)
            .ok_or_else(|| PhenotypeError::UnknownLocus(locus.to_string()))?;
        entry
            .dominant
            .ok_or_else(|| PhenotypeError::LocusExhausted(locus.to_string()))
    }

    pub fn resolve_with_stack(&self, locus: &str) -> Result<(Digest, Vec<Digest>)> {
        let doc = self.doc.read();
        let entry = doc
            .loci
            .get(locus)
            .ok_or_else(|| PhenotypeError::UnknownLocus(locus.to_string()))?;
        let dominant = entry
            .dominant
            .ok_or_else(|| PhenotypeError::LocusExhausted(locus.to_string()))?;
        Ok((dominant, entry.fallback.clone()))
    }

    /// Insert a newly generated, not-yet-dominant allele into `locus`'s
    /// fallback stack (seeding it as dominant instead if the locus has
    /// none yet). Used by `sg-mutation` to install a locus-scoped mutation
    /// at shadow or recessive per risk policy — `sg-arena`'s promotion rule
    /// is the only path from here to dominant.
    pub fn add_candidate(&self, locus: &str, digest: Digest) -> Result<()> {
        let needs_seed = {
            let doc = self.doc.read();
            doc.loci.get(locus).map(|e| e.dominant.is_none()).unwrap_or(true)
        };
        if needs_seed {
            return self.seed_dominant(locus, digest);
        }
        {
            let mut doc = self.doc.write();
            let entry = doc.loci.entry(locus.to_string()).or_default();
            if entry.dominant != Some(digest) && !entry.fallback.contains(&digest) {
                entry.fallback.push(digest);
            }
        }
        self.resort_fallback(locus)
    }

    /// `digest` becomes dominant for `locus`; the previous dominant (if any)
    /// is pushed into the fallback stack and the stack is re-sorted by
    /// current fitness (spec.md §3's "descending historical fitness among
    /// living alleles" invariant; a literal "push to head" would only hold
    /// by coincidence, so this call reconciles the two by re-sorting
    /// immediately, per SPEC_FULL.md §3's resort-on-entry rule).
    pub fn promote(&self, locus: &str, digest: Digest) -> Result<()> {
        let previous = {
            let mut doc = self.doc.write();
            let entry = doc.loci.entry(locus.to_string()).or_default();
            if entry.dominant == Some(digest) {
                return Ok(());
            }
            let previous = entry.dominant.replace(digest);
            entry.fallback.retain(|d| *d != digest);
            if let Some(prev) = previous {
                if !entry.fallback.contains(&prev) {
                    entry.fallback.push(prev);
                }
            }
            previous
        };
        self.registry.set_state(digest, LifecycleState::Dominant)?;
        if let Some(prev) = previous {
            self.registry.set_state(prev, LifecycleState::Recessive)?;
        }
        self.resort_fallback(locus)?;
        debug!(locus, digest = %digest, "promoted allele to dominant");
        self.persist()
    }

    /// Dominant pops to recessive; the highest-fitness fallback candidate
    /// becomes dominant. Errors with `LocusExhausted` if the fallback stack
    /// is empty.
    pub fn demote(&self, locus: &str) -> Result<()> {
        let transition = {
            let mut doc = self.doc.write();
            let entry = doc
                .loci
                .get_mut(locus)
                .ok_or_else(|| PhenotypeError::UnknownLocus(locus.to_string()))?;
            let old_dominant = entry
                .dominant
                .ok_or_else(|| PhenotypeError::LocusExhausted(locus.to_string()))?;
            if entry.fallback.is_empty() {
                entry.dominant = None;
                None
            } else {
                let new_dominant = entry.fallback.remove(0);
                entry.dominant = Some(new_dominant);
                entry.fallback.push(old_dominant);
                Some((old_dominant, new_dominant))
            }
        };
        match transition {
            None => {
                // Dropped to no dominant; persist so the empty slot survives a
                // close/open round-trip rather than resurrecting the demoted
                // allele from the stale on-disk document.
                self.persist()?;
                warn!(locus, "locus exhausted: fallback stack empty, no dominant remains");
                Err(PhenotypeError::LocusExhausted(locus.to_string()))
            }
            Some((old_dominant, new_dominant)) => {
                self.registry.set_state(old_dominant, LifecycleState::Recessive)?;
                self.registry.set_state(new_dominant, LifecycleState::Dominant)?;
                self.resort_fallback(locus)?;
                warn!(locus, demoted = %old_dominant, promoted = %new_dominant, "locus demotion");
                self.persist()
            }
        }
    }

    /// Re-sort `locus`'s fallback stack by descending current fitness among
    /// living alleles, dropping any that have since been deprecated.
    /// Called after promotion/demotion and after any fitness update that
    /// might have crossed a neighbor in the stack (SPEC_FULL.md §3).
    pub fn resort_fallback(&self, locus: &str) -> Result<()> {
        let digests: Vec<Digest> = {
            let doc = self.doc.read();
            match doc.loci.get(locus) {
                Some(e) => e.fallback.clone(),
                None => return Ok(()),
            }
        };

        let mut scored = Vec::with_capacity(digests.len());
        for digest in digests {
            let allele = match self.registry.get(digest) {
                Ok(a) => a,
                Err(_) => continue,
            };
            if !allele.state.is_living() {
                continue;
            }
            scored.push((digest, allele.fitness.fitness));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

        let sorted: Vec<Digest> = scored.into_iter().map(|(d, _)| d).collect();
        {
            let mut doc = self.doc.write();
            if let Some(entry) = doc.loci.get_mut(locus) {
                entry.fallback = sorted;
            }
        }
        self.persist()
    }

    pub fn pathway_state(&self, name: &str) -> FusionRecord {
        let doc = self.doc.read();
        doc.pathways.get(name).map(FusionRecord::from).unwrap_or_default()
    }

    pub fn set_fusion(&self, name: &str, digest: Digest) -> Result<()> {
        {
            let mut doc = self.doc.write();
            let entry: &mut PathwayEntry = doc.pathways.entry(name.to_string()).or_default();
            entry.fused_allele = Some(digest);
        }
        self.persist()
    }

    pub fn clear_fusion(&self, name: &str) -> Result<()> {
        {
            let mut doc = self.doc.write();
            if let Some(entry) = doc.pathways.get_mut(name) {
                entry.fused_allele = None;
            }
        }
        self.persist()
    }

    /// Record the composition and reinforcement count observed by the
    /// fusion tracker for `name`. Called by `sg-fusion` after each
    /// successful run.
    pub fn set_reinforcement(&self, name: &str, composition: Vec<Digest>, count: u64) -> Result<()> {
        {
            let mut doc = self.doc.write();
            let entry = doc.pathways.entry(name.to_string()).or_default();
            entry.last_composition = composition;
            entry.reinforcement_count = count;
        }
        self.persist()
    }

    /// Every digest currently referenced anywhere in the document — used to
    /// validate the "every digest in phenotype exists in the registry"
    /// invariant (spec.md §3) from outside this crate.
    pub fn referenced_digests(&self) -> Vec<Digest> {
        let doc = self.doc.read();
        let mut out = Vec::new();
        for entry in doc.loci.values() {
            out.extend(entry.dominant);
            out.extend(entry.fallback.iter().copied());
        }
        for entry in doc.pathways.values() {
            out.extend(entry.fused_allele);
            out.extend(entry.last_composition.iter().copied());
        }
        out
    }
}

fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> anyhow::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents).context("writing temp file")?;
    tmp.flush().context("flushing temp file")?;
    tmp.persist(dir.join(name))
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp file into place at {}", dir.join(name).display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_types::Timestamp;

    fn setup() -> (tempfile::TempDir, Arc<Registry>, PhenotypeMap) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());
        let map = PhenotypeMap::open(dir.path(), registry.clone()).unwrap();
        (dir, registry, map)
    }

    #[test]
    fn seed_then_resolve() {
        let (_dir, registry, map) = setup();
        let digest = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.seed_dominant("x", digest).unwrap();
        assert_eq!(map.resolve("x").unwrap(), digest);
    }

    #[test]
    fn unknown_locus_errors() {
        let (_dir, _registry, map) = setup();
        assert!(matches!(map.resolve("ghost"), Err(PhenotypeError::UnknownLocus(_))));
    }

    #[test]
    fn add_candidate_seeds_dominant_when_locus_is_new() {
        let (_dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.add_candidate("x", a).unwrap();
        assert_eq!(map.resolve("x").unwrap(), a);
    }

    #[test]
    fn add_candidate_joins_fallback_when_dominant_exists() {
        let (_dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        let b = registry
            .put("b", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.seed_dominant("x", a).unwrap();
        map.add_candidate("x", b).unwrap();
        let (dominant, fallback) = map.resolve_with_stack("x").unwrap();
        assert_eq!(dominant, a);
        assert_eq!(fallback, vec![b]);
    }

    #[test]
    fn promote_pushes_previous_dominant_to_fallback() {
        let (_dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        let b = registry
            .put("b", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.seed_dominant("x", a).unwrap();
        map.promote("x", b).unwrap();
        let (dominant, fallback) = map.resolve_with_stack("x").unwrap();
        assert_eq!(dominant, b);
        assert_eq!(fallback, vec![a]);
        assert!(!fallback.contains(&b));
    }

    #[test]
    fn demote_promotes_best_fallback() {
        let (_dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        let b = registry
            .put("b", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        registry
            .update_fitness(
                b,
                sg_registry::FitnessSummary {
                    invocations: 10,
                    successes: 9,
                    consecutive_failures: 0,
                    fitness: 0.9,
                },
            )
            .unwrap();
        map.seed_dominant("x", a).unwrap();
        map.promote("x", b).unwrap();
        // b dominant, a in fallback; now demote b
        map.demote("x").unwrap();
        let (dominant, fallback) = map.resolve_with_stack("x").unwrap();
        assert_eq!(dominant, a);
        assert_eq!(fallback, vec![b]);
    }

    #[test]
    fn demote_with_empty_fallback_reports_exhausted() {
        let (_dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.seed_dominant("x", a).unwrap();
        let err = map.demote("x").unwrap_err();
        assert!(matches!(err, PhenotypeError::LocusExhausted(_)));
        assert!(matches!(map.resolve("x"), Err(PhenotypeError::LocusExhausted(_))));
    }

    #[test]
    fn demote_with_empty_fallback_persists_before_erroring() {
        let (dir, registry, map) = setup();
        let a = registry
            .put("a", "x", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        map.seed_dominant("x", a).unwrap();
        map.demote("x").unwrap_err();

        // Reopen against the same root: the on-disk document must reflect
        // the cleared dominant slot, not resurrect the demoted allele.
        let reopened = PhenotypeMap::open(dir.path(), registry).unwrap();
        assert!(matches!(reopened.resolve("x"), Err(PhenotypeError::LocusExhausted(_))));
    }

    #[test]
    fn fusion_round_trip() {
        let (_dir, registry, map) = setup();
        let digest = registry
            .put("a", "p", None, Default::default(), Timestamp::from_millis(0))
            .unwrap();
        assert_eq!(map.pathway_state("p"), FusionRecord::default());
        map.set_fusion("p", digest).unwrap();
        assert_eq!(map.pathway_state("p").fused_allele, Some(digest));
        map.clear_fusion("p").unwrap();
        assert_eq!(map.pathway_state("p").fused_allele, None);
    }
}
