//! Component C: the allele loader and its structured-expression sandbox
//! interpreter (SPEC_FULL.md §5's chosen realization of spec.md §4.C).

mod builtins;
pub mod capability;
pub mod error;
mod interpreter;
mod loader;
pub mod program;
pub mod value;

pub use capability::{Capability, NullCapability};
pub use error::{Result, SandboxError};
pub use interpreter::GeneUnit;
pub use loader::Loader;
pub use program::{Instr, Program, DENIED_BUILTINS, WHITELISTED_MODULES};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct RecordingCapability {
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl Capability for RecordingCapability {
        fn call(&self, operation: &str, _args: &[Value]) -> std::result::Result<Value, String> {
            self.calls.lock().unwrap().push(operation.to_string());
            Ok(Value::Bool(true))
        }
    }

    fn load(source: &str) -> GeneUnit {
        let loader = Loader::new();
        let digest = sg_types::Digest::of_source(source);
        loader.load(digest, source).unwrap()
    }

    #[test]
    fn import_of_non_whitelisted_module_is_denied() {
        let source = r#"{"execute": {"op": "import", "module": "os"}}"#;
        let unit = load(source);
        let err = unit
            .execute("null", &NullCapability, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SandboxError::ImportDenied { .. }));
    }

    #[test]
    fn import_of_whitelisted_module_succeeds() {
        let source = r#"{"execute": {"op": "import", "module": "strings"}}"#;
        let unit = load(source);
        unit.execute("null", &NullCapability, Duration::from_secs(1))
            .unwrap();
    }

    #[test]
    fn denied_builtin_is_rejected() {
        let source = r#"{"execute": {"op": "call", "name": "exit", "args": []}}"#;
        let unit = load(source);
        let err = unit
            .execute("null", &NullCapability, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SandboxError::BuiltinDenied { .. }));
    }

    #[test]
    fn unknown_builtin_is_a_runtime_fault_not_a_denial() {
        let source = r#"{"execute": {"op": "call", "name": "frobnicate", "args": []}}"#;
        let unit = load(source);
        let err = unit
            .execute("null", &NullCapability, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeFault { .. }));
    }

    #[test]
    fn timeout_on_zero_budget() {
        // 128 literal evaluations guarantees at least one deadline check
        // (every DEADLINE_CHECK_INTERVAL steps) fires before the block
        // completes; a zero-millisecond budget is overdue the instant any
        // check runs.
        let exprs: Vec<serde_json::Value> = (0..128)
            .map(|i| serde_json::json!({"op": "lit", "value": i}))
            .collect();
        let source = serde_json::json!({"execute": {"op": "block", "exprs": exprs}}).to_string();
        let unit = load(&source);
        let err = unit
            .execute("null", &NullCapability, Duration::from_millis(0))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
    }

    #[test]
    fn capability_call_is_dispatched_by_name() {
        let source = r#"{
            "execute": {
                "op": "cap",
                "name": "write_config",
                "args": [{"op": "var", "name": "input"}]
            }
        }"#;
        let unit = load(source);
        let cap = RecordingCapability { calls: Default::default() };
        let out = unit
            .execute("{\"k\":\"v\"}", &cap, Duration::from_secs(1))
            .unwrap();
        assert_eq!(out, "true");
        assert_eq!(cap.calls.lock().unwrap().as_slice(), ["write_config"]);
    }

    #[test]
    fn arithmetic_and_field_access_compose() {
        let source = r#"{
            "execute": {
                "op": "call", "name": "add",
                "args": [
                    {"op": "field", "of": {"op": "var", "name": "input"}, "name": "x"},
                    {"op": "lit", "value": 1}
                ]
            }
        }"#;
        let unit = load(source);
        let out = unit
            .execute("{\"x\":41}", &NullCapability, Duration::from_secs(1))
            .unwrap();
        assert_eq!(out, "42");
    }
}
