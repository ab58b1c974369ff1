//! Component C: the stateless loader with a compiled-unit cache (spec.md
//! §4.C: "repeated `load` of the same digest may cache the compiled
//! unit").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sg_types::Digest;
use tracing::debug;

use crate::error::Result;
use crate::interpreter::GeneUnit;
use crate::program::Program;

#[derive(Default)]
pub struct Loader {
    cache: RwLock<HashMap<Digest, Arc<Program>>>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the allele at `digest` from its `source` text, using the cached
    /// compiled program if `load` has already seen this digest.
    pub fn load(&self, digest: Digest, source: &str) -> Result<GeneUnit> {
        if let Some(program) = self.cache.read().get(&digest).cloned() {
            return Ok(GeneUnit::new(digest, program));
        }

        let program = Arc::new(Program::parse(source)?);
        self.cache.write().insert(digest, program.clone());
        debug!(digest = %digest, "compiled and cached allele program");
        Ok(GeneUnit::new(digest, program))
    }
}
