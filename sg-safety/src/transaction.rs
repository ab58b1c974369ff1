//! Transaction contract, spec.md §4.E/§9: instead of an inheritance or
//! interception trick, the safety layer holds a registration table mapping
//! each capability operation name to an `(execute, inverse_builder)` pair
//! and wraps the capability so every mutating call records its inverse.
//! Grounded on `housaky-evolution::dgm::evaluate_proposal`'s copy → apply →
//! evaluate → discard shape, here realized as an in-memory undo log instead
//! of a throwaway directory copy, since a gene's capability — not the
//! filesystem — is the thing that needs rewinding.

use std::collections::HashMap;

use parking_lot::Mutex;
use sg_sandbox::{Capability, Value};

use crate::error::{Result, SafetyError};

/// Given the arguments a call was made with, produce the inverse call
/// `(operation, args)` to undo it, or `None` if the operation has no
/// meaningful inverse (e.g. it was already read-only).
pub type InverseBuilder = Box<dyn Fn(&[Value]) -> Option<(String, Vec<Value>)> + Send + Sync>;

/// Registration table: one inverse builder per mutating operation name.
/// Operations with no entry pass through the wrapped capability untracked —
/// callers register every operation a configuration gene's contract allows.
#[derive(Default)]
pub struct CapabilityTable {
    inverses: HashMap<String, InverseBuilder>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: impl Into<String>, builder: InverseBuilder) {
        self.inverses.insert(operation.into(), builder);
    }

    fn inverse_for(&self, operation: &str, args: &[Value]) -> Option<(String, Vec<Value>)> {
        self.inverses.get(operation).and_then(|build| build(args))
    }
}

/// One gene invocation's undo log: every inverse recorded so far, in call
/// order. Drained in reverse on rollback.
#[derive(Default)]
pub struct Transaction {
    log: Vec<(String, Vec<Value>)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Commit: discard the undo log, the invocation's effects stand.
    pub fn commit(self) {}

    /// Drain the undo log in reverse, attempting every inverse independently
    /// even if an earlier one fails. Individual failures are recorded but do
    /// not stop the drain (spec.md §4.E).
    pub fn rollback(self, capability: &dyn Capability) -> Result<()> {
        let total = self.log.len();
        let mut failed = 0usize;
        for (operation, args) in self.log.into_iter().rev() {
            if let Err(e) = capability.call(&operation, &args) {
                tracing::warn!(operation, error = %e, "inverse failed during rollback");
                failed += 1;
            }
        }
        if failed > 0 {
            Err(SafetyError::Incomplete { failed, total })
        } else {
            Ok(())
        }
    }
}

/// Wraps a capability so every successful call whose operation has a
/// registered inverse appends that inverse to the transaction's undo log.
/// `risk.transaction == false` (spec.md §4.E, risk `none`) means a gene runs
/// against the inner capability directly instead of through this wrapper.
pub struct TransactionalCapability<'a> {
    inner: &'a dyn Capability,
    table: &'a CapabilityTable,
    transaction: Mutex<Transaction>,
}

impl<'a> TransactionalCapability<'a> {
    pub fn new(inner: &'a dyn Capability, table: &'a CapabilityTable) -> Self {
        Self { inner, table, transaction: Mutex::new(Transaction::new()) }
    }

    /// Take the accumulated undo log, leaving this wrapper's transaction
    /// empty. Call once after the invocation completes, then either
    /// `commit` or `rollback` the returned transaction.
    pub fn take_transaction(&self) -> Transaction {
        std::mem::take(&mut *self.transaction.lock())
    }
}

impl Capability for TransactionalCapability<'_> {
    fn call(&self, operation: &str, args: &[Value]) -> std::result::Result<Value, String> {
        let result = self.inner.call(operation, args)?;
        if let Some(inverse) = self.table.inverse_for(operation, args) {
            self.transaction.lock().log.push(inverse);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingCapability {
        calls: StdMutex<Vec<String>>,
    }

    impl Capability for RecordingCapability {
        fn call(&self, operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            self.calls.lock().unwrap().push(operation.to_string());
            Ok(Value::Bool(true))
        }
    }

    fn set_table() -> CapabilityTable {
        let mut table = CapabilityTable::new();
        table.register(
            "set",
            Box::new(|args: &[Value]| {
                let key = args.first()?.as_str()?.to_string();
                Some(("unset".to_string(), vec![Value::Str(key)]))
            }),
        );
        table
    }

    #[test]
    fn committed_transaction_leaves_no_inverse_call() {
        let inner = RecordingCapability { calls: Default::default() };
        let table = set_table();
        let wrapped = TransactionalCapability::new(&inner, &table);
        wrapped.call("set", &[Value::Str("k".into()), Value::Str("v".into())]).unwrap();
        let tx = wrapped.take_transaction();
        assert_eq!(tx.len(), 1);
        tx.commit();
        assert_eq!(inner.calls.lock().unwrap().as_slice(), ["set"]);
    }

    #[test]
    fn rollback_drains_inverses_in_reverse() {
        let inner = RecordingCapability { calls: Default::default() };
        let table = set_table();
        let wrapped = TransactionalCapability::new(&inner, &table);
        wrapped.call("set", &[Value::Str("a".into()), Value::Str("1".into())]).unwrap();
        wrapped.call("set", &[Value::Str("b".into()), Value::Str("2".into())]).unwrap();
        let tx = wrapped.take_transaction();
        tx.rollback(&inner).unwrap();
        assert_eq!(
            inner.calls.lock().unwrap().as_slice(),
            ["set", "set", "unset", "unset"]
        );
    }

    #[test]
    fn unregistered_operation_is_not_tracked() {
        let inner = RecordingCapability { calls: Default::default() };
        let table = CapabilityTable::new();
        let wrapped = TransactionalCapability::new(&inner, &table);
        wrapped.call("read_only", &[]).unwrap();
        let tx = wrapped.take_transaction();
        assert!(tx.is_empty());
    }

    #[test]
    fn individual_inverse_failures_do_not_stop_the_drain() {
        struct FlakyCapability;
        impl Capability for FlakyCapability {
            fn call(&self, operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
                if operation == "unset" {
                    Err("boom".to_string())
                } else {
                    Ok(Value::Bool(true))
                }
            }
        }
        let inner = FlakyCapability;
        let table = set_table();
        let wrapped = TransactionalCapability::new(&inner, &table);
        wrapped.call("set", &[Value::Str("a".into()), Value::Str("1".into())]).unwrap();
        wrapped.call("set", &[Value::Str("b".into()), Value::Str("2".into())]).unwrap();
        let tx = wrapped.take_transaction();
        let err = tx.rollback(&inner).unwrap_err();
        assert!(matches!(err, SafetyError::Incomplete { failed: 2, total: 2 }));
    }
}
