//! Regression events: a per-allele running-peak fitness tracker that flags
//! a mild or severe drop, and the `.sg/regression.json` log that lets an
//! external reader (the mutation engine, a dashboard) see recent history.
//! Grounded on `housaky-evolution::dgm::DgmEngine`'s archive — there, an
//! `ArchiveEntry` list trimmed by best-fitness; here, a running peak per
//! allele compared against its current score instead of a population
//! archive, since regression is about one allele getting worse over time
//! rather than selecting among many.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use sg_types::{Digest, Timestamp};

/// Events retained per locus before the oldest is dropped.
const REGRESSION_RING_CAPACITY: usize = 64;
const REGRESSION_FILE: &str = ".sg/regression.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionKind {
    Mild,
    Severe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionEvent {
    pub locus: String,
    pub digest: Digest,
    pub kind: RegressionKind,
    pub fitness_at_event: f64,
    pub peak_fitness: f64,
    pub recorded_at: Timestamp,
}

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct RegressionLog {
    pub by_locus: BTreeMap<String, VecDeque<RegressionEvent>>,
}

impl RegressionLog {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join(REGRESSION_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(log) => Ok(log),
                Err(e) => {
                    tracing::warn!(error = %e, "regression log corrupt, starting empty");
                    Ok(Self::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).context("reading regression log"),
        }
    }

    pub fn push(&mut self, event: RegressionEvent) {
        let ring = self.by_locus.entry(event.locus.clone()).or_default();
        ring.push_back(event);
        while ring.len() > REGRESSION_RING_CAPACITY {
            ring.pop_front();
        }
    }

    pub fn recent(&self, locus: &str) -> Vec<RegressionEvent> {
        self.by_locus
            .get(locus)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn persist(&self, root: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self).context("serialising regression log")?;
        let dir = root.join(".sg");
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        write_atomic(&dir, "regression.json", &json)
    }
}

fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> anyhow::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents).context("writing temp file")?;
    tmp.flush().context("flushing temp file")?;
    let target: PathBuf = dir.join(name);
    tmp.persist(&target)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp file into place at {}", target.display()))?;
    Ok(())
}
