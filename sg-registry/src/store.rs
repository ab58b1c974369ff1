//! On-disk content-addressed store: `<digest>.src` files plus one
//! `index.json` keyed map, following spec.md §4.A and the on-disk layout of
//! §6. Grounded in the put/get shape of `housaky-storage::content`'s
//! `StorageClient` (there: blake3 digest, async, network-backed cache;
//! here: SHA-256, sync, single coarse lock, local disk only) and the
//! absence-is-not-an-error convention of a `BlobStore`-style trait.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use parking_lot::RwLock;
use sg_types::{canonicalise, Digest, Timestamp};
use tracing::warn;

use crate::allele::{Allele, FitnessSummary, IndexEntry, LifecycleState, MutationContext};
use crate::error::{RegistryError, Result};

const REGISTRY_DIR: &str = ".sg/registry";
const INDEX_FILE: &str = "index.json";

struct Inner {
    index: BTreeMap<Digest, IndexEntry>,
}

/// The allele registry for one project root. One instance per process is
/// expected (spec.md §9: "process-wide singletons with an explicit
/// lifecycle"); construct via [`Registry::open`].
pub struct Registry {
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl Registry {
    /// Open (or initialise) the registry under `root`. Creates
    /// `<root>/.sg/registry/` if absent; loads `index.json` if present,
    /// rebuilding from per-digest files if it is corrupt.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join(REGISTRY_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating registry dir {}", dir.display()))
            .map_err(RegistryError::Io)?;

        let index_path = dir.join(INDEX_FILE);
        let index = match fs::read_to_string(&index_path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<Digest, IndexEntry>>(&raw) {
                Ok(index) => index,
                Err(e) => {
                    warn!(error = %e, "registry index corrupt, rebuilding from source files");
                    Self::rebuild_index(&dir)?
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "registry index unreadable, rebuilding from source files");
                Self::rebuild_index(&dir)?
            }
        };

        let registry = Self {
            dir,
            inner: RwLock::new(Inner { index }),
        };
        registry.persist_index()?;
        Ok(registry)
    }

    /// Best-effort reconstruction from `<digest>.src` files alone. Recovered
    /// entries carry no locus/parent/lifecycle history — that metadata only
    /// ever lived in the index — so they are marked `recessive` with a
    /// `recovered` diagnostic flag and a locus of `"unknown"`.
    fn rebuild_index(dir: &Path) -> Result<BTreeMap<Digest, IndexEntry>> {
        let mut index = BTreeMap::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("scanning {} for recovery", dir.display()))
            .map_err(RegistryError::Io)?;

        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::Io(e.into()))?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("src") {
                continue;
            }
            let Ok(digest) = stem.parse::<Digest>() else {
                continue;
            };

            let mut mutation_ctx = MutationContext::default();
            mutation_ctx
                .diagnostics
                .insert("recovered".to_string(), "true".to_string());

            index.insert(
                digest,
                IndexEntry {
                    locus: "unknown".to_string(),
                    generation: 0,
                    parent: None,
                    created_at: Timestamp::from_millis(0),
                    mutation_ctx,
                    state: LifecycleState::Recessive,
                    fitness: FitnessSummary::default(),
                },
            );
        }
        Ok(index)
    }

    fn src_path(&self, digest: &Digest) -> PathBuf {
        self.dir.join(format!("{}.src", digest.to_hex()))
    }

    fn persist_index(&self) -> Result<()> {
        let inner = self.inner.read();
        let json = serde_json::to_vec_pretty(&inner.index)
            .context("serialising registry index")
            .map_err(RegistryError::Io)?;
        write_atomic(&self.dir, INDEX_FILE, &json).map_err(RegistryError::Io)
    }

    /// Store `source` under `locus`, deduplicating on digest. Returns the
    /// digest whether or not this call created a new record.
    pub fn put(
        &self,
        source: &str,
        locus: impl Into<String>,
        parent: Option<Digest>,
        mutation_ctx: MutationContext,
        now: Timestamp,
    ) -> Result<Digest> {
        let canonical = canonicalise(source);
        let digest = Digest::of_source(&canonical);

        {
            let inner = self.inner.read();
            if inner.index.contains_key(&digest) {
                return Ok(digest);
            }
        }

        write_atomic(&self.dir, &format!("{}.src", digest.to_hex()), canonical.as_bytes())
            .map_err(RegistryError::Io)?;

        let locus = locus.into();
        let generation = parent
            .and_then(|p| self.inner.read().index.get(&p).map(|e| e.generation + 1))
            .unwrap_or(0);
        let state = LifecycleState::Recessive;

        {
            let mut inner = self.inner.write();
            inner.index.entry(digest).or_insert(IndexEntry {
                locus,
                generation,
                parent,
                created_at: now,
                mutation_ctx,
                state,
                fitness: FitnessSummary::default(),
            });
        }
        self.persist_index()?;
        Ok(digest)
    }

    /// Fetch the full allele record, reading its source text from disk.
    pub fn get(&self, digest: Digest) -> Result<Allele> {
        let entry = {
            let inner = self.inner.read();
            inner
                .index
                .get(&digest)
                .cloned()
                .ok_or(RegistryError::NotFound(digest))?
        };
        let source = fs::read_to_string(self.src_path(&digest))
            .with_context(|| format!("reading source for {digest}"))
            .map_err(RegistryError::Io)?;
        Ok(entry.into_allele(digest, source))
    }

    /// Digests of every allele recorded for `locus`, in no particular order.
    pub fn list(&self, locus: &str) -> Vec<Digest> {
        self.inner
            .read()
            .index
            .iter()
            .filter(|(_, e)| e.locus == locus)
            .map(|(d, _)| *d)
            .collect()
    }

    /// Overwrite the persisted fitness summary for `digest`. Called by
    /// `sg-arena` after recomputing fitness from its observation ring.
    pub fn update_fitness(&self, digest: Digest, fitness: FitnessSummary) -> Result<()> {
        {
            let mut inner = self.inner.write();
            let entry = inner
                .index
                .get_mut(&digest)
                .ok_or(RegistryError::NotFound(digest))?;
            entry.fitness = fitness;
        }
        self.persist_index()
    }

    /// Transition an allele's lifecycle state in place.
    pub fn set_state(&self, digest: Digest, state: LifecycleState) -> Result<()> {
        {
            let mut inner = self.inner.write();
            let entry = inner
                .index
                .get_mut(&digest)
                .ok_or(RegistryError::NotFound(digest))?;
            entry.state = state;
        }
        self.persist_index()
    }

    /// Walk `parent` pointers from `digest` up to a seed allele
    /// (`parent == None`), returning the chain starting at `digest`.
    /// Bounded by a depth guard so a corrupted index (a parent cycle) fails
    /// loudly instead of looping forever.
    pub fn lineage(&self, digest: Digest) -> Result<Vec<Digest>> {
        const MAX_DEPTH: usize = 10_000;
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut current = digest;
        let mut seen = std::collections::HashSet::new();

        loop {
            if !seen.insert(current) {
                return Err(RegistryError::Corrupt(format!(
                    "cycle detected in lineage of {digest} at {current}"
                )));
            }
            if chain.len() >= MAX_DEPTH {
                return Err(RegistryError::Corrupt(format!(
                    "lineage of {digest} exceeds max depth {MAX_DEPTH}"
                )));
            }
            let entry = inner
                .index
                .get(&current)
                .ok_or(RegistryError::NotFound(current))?;
            chain.push(current);
            match entry.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(chain)
    }
}

/// Write `contents` to `dir/name` via a temp file in the same directory
/// followed by an atomic rename, so a crash mid-write never leaves a
/// partially-written file at the final path.
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

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn put_is_idempotent_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::open(dir.path()).unwrap();
        let d1 = reg
            .put("fn x() {}\n", "noop", None, MutationContext::default(), ts(0))
            .unwrap();
        let d2 = reg
            .put("fn x() {}\n", "noop", None, MutationContext::default(), ts(1))
            .unwrap();
        assert_eq!(d1, d2);
        assert_eq!(reg.list("noop").len(), 1);
    }

    #[test]
    fn round_trip_preserves_source() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::open(dir.path()).unwrap();
        let digest = reg
            .put("fn x() {}\n", "noop", None, MutationContext::default(), ts(0))
            .unwrap();
        let allele = reg.get(digest).unwrap();
        assert_eq!(allele.source, "fn x() {}");
    }

    #[test]
    fn reopen_reloads_index() {
        let dir = tempfile::tempdir().unwrap();
        let digest = {
            let reg = Registry::open(dir.path()).unwrap();
            reg.put("fn x() {}\n", "noop", None, MutationContext::default(), ts(0))
                .unwrap()
        };
        let reg = Registry::open(dir.path()).unwrap();
        let allele = reg.get(digest).unwrap();
        assert_eq!(allele.locus, "noop");
    }

    #[test]
    fn corrupt_index_rebuilds_from_source_files() {
        let dir = tempfile::tempdir().unwrap();
        let digest = {
            let reg = Registry::open(dir.path()).unwrap();
            reg.put("fn x() {}\n", "noop", None, MutationContext::default(), ts(0))
                .unwrap()
        };
        fs::write(dir.path().join(".sg/registry/index.json"), b"{not json").unwrap();
        let reg = Registry::open(dir.path()).unwrap();
        let allele = reg.get(digest).unwrap();
        assert_eq!(allele.locus, "unknown");
        assert_eq!(
            allele.mutation_ctx.diagnostics.get("recovered").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn lineage_walks_to_seed() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::open(dir.path()).unwrap();
        let seed = reg
            .put("a", "x", None, MutationContext::default(), ts(0))
            .unwrap();
        let child = reg
            .put("b", "x", Some(seed), MutationContext::default(), ts(1))
            .unwrap();
        let chain = reg.lineage(child).unwrap();
        assert_eq!(chain, vec![child, seed]);
    }

    #[test]
    fn update_fitness_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let digest = {
            let reg = Registry::open(dir.path()).unwrap();
            let d = reg
                .put("a", "x", None, MutationContext::default(), ts(0))
                .unwrap();
            reg.update_fitness(
                d,
                FitnessSummary {
                    invocations: 5,
                    successes: 4,
                    consecutive_failures: 0,
                    fitness: 0.4,
                },
            )
            .unwrap();
            d
        };
        let reg = Registry::open(dir.path()).unwrap();
        let allele = reg.get(digest).unwrap();
        assert_eq!(allele.fitness.invocations, 5);
        assert!((allele.fitness.fitness - 0.4).abs() < 1e-9);
    }
}
