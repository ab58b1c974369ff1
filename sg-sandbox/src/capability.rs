//! `gene_sdk`: the capability object injected into gene execution
//! (spec.md §6). The core does not mandate its surface beyond this —
//! `sg-safety` wraps an implementation to intercept mutating calls for
//! the undo log.

use crate::value::Value;

/// A named operation an allele may invoke. The core treats every call as
/// opaque; only `sg-safety`'s wrapper inspects the operation name (to look
/// up its registered inverse builder).
pub trait Capability: Send + Sync {
    fn call(&self, operation: &str, args: &[Value]) -> Result<Value, String>;
}

/// A capability that accepts no operations; useful as a default for
/// diagnostic genes, which never mutate anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCapability;

impl Capability for NullCapability {
    fn call(&self, operation: &str, _args: &[Value]) -> Result<Value, String> {
        Err(format!("null capability rejects operation {operation:?}"))
    }
}
