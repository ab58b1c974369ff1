//! The eleven error kinds of spec §7, aggregated into one enum that crosses
//! crate boundaries. Each crate keeps its own narrower error type internally
//! (see each crate's `error` module) and converts into this one at its
//! public surface, the way `housaky-evolution`'s modules use `anyhow`
//! internally but a caller-facing API should commit to a stable set of
//! variants callers can match on.

use thiserror::Error;

use crate::digest::Digest;

/// Errors observable at the runtime's public API surface.
#[derive(Debug, Error, Clone)]
pub enum SgError {
    /// Invocation output did not conform to the locus's `gives` schema.
    /// Locally recovered: scored as a failure, next allele in the fallback
    /// stack is tried.
    #[error("output for locus {locus:?} did not match schema: {detail}")]
    SchemaMismatch { locus: String, detail: String },

    /// Allele source tried to resolve a module name outside the loader
    /// whitelist.
    #[error("allele {digest} attempted to import non-whitelisted module {module:?}")]
    SandboxImportDenied { digest: Digest, module: String },

    /// Allele source called a denied capability (eval, process exit, ...).
    #[error("allele {digest} attempted to call denied builtin {builtin:?}")]
    SandboxBuiltinDenied { digest: Digest, builtin: String },

    /// Wall-clock deadline for the invocation elapsed.
    #[error("allele {digest} exceeded its {budget_ms}ms execution deadline")]
    SandboxTimeout { digest: Digest, budget_ms: u64 },

    /// Any other interpreter fault: stack underflow, type mismatch, missing
    /// field reference, and so on.
    #[error("allele {digest} faulted during execution: {detail}")]
    SandboxRuntimeFault { digest: Digest, detail: String },

    /// A pathway binding expression referenced a name that does not exist.
    /// Fatal for the pathway; not a fitness signal for any allele.
    #[error("pathway {pathway:?} step {step} binding error: {detail}")]
    BindingError {
        pathway: String,
        step: usize,
        detail: String,
    },

    /// Rollback of a transaction's undo log encountered errors partway
    /// through the drain.
    #[error("transaction rollback left {failed_inverses} of {total_inverses} inverses unresolved")]
    TransactionIncomplete {
        failed_inverses: usize,
        total_inverses: usize,
    },

    /// The on-disk registry index was inconsistent with the per-digest
    /// source files and could not be rebuilt.
    #[error("registry index corrupt and could not be rebuilt: {detail}")]
    RegistryCorrupt { detail: String },

    /// The injected capability refused a mutating operation.
    #[error("capability refused operation {operation:?}: protected resource")]
    ProtectedResource { operation: String },

    /// The external mutation engine returned nothing usable (error, or
    /// source with no `execute` entry point).
    #[error("mutation engine failed for locus {locus:?}: {detail}")]
    MutationEngineFailure { locus: String, detail: String },

    /// Every allele for a locus has failed; pathway fails per its failure
    /// policy; triggers reactive mutation.
    #[error("locus {locus:?} is exhausted: every allele in its stack has failed")]
    LocusExhausted { locus: String },
}

impl SgError {
    /// True for errors that are recorded as a fitness observation and
    /// recovered locally (spec §7: "never propagate to the pathway caller
    /// unless the pathway fails as a whole"); false for errors that are
    /// fatal to the enclosing pathway run.
    pub fn is_locally_recovered(&self) -> bool {
        matches!(
            self,
            SgError::SchemaMismatch { .. }
                | SgError::SandboxImportDenied { .. }
                | SgError::SandboxBuiltinDenied { .. }
                | SgError::SandboxTimeout { .. }
                | SgError::SandboxRuntimeFault { .. }
                | SgError::ProtectedResource { .. }
        )
    }
}
