//! The tiny binding DSL of spec.md §4.F: `{name}` for a pathway input or a
//! bound iteration variable, `{step N.field}` for an earlier step's output.
//! No other expression form is permitted in the core; evaluation failure
//! (missing or mistyped reference) is always fatal for the pathway, never a
//! fitness signal — the caller gets a `BindingError`, no allele is blamed.

use std::collections::HashMap;

use sg_sandbox::Value;

/// Everything a binding expression may be evaluated against: the pathway's
/// own input, every step's output recorded so far (keyed by the step's
/// declared `index`, not its position in the DAG), and the current
/// iteration variable (`item`), if any.
pub struct BindingContext<'a> {
    pub input: &'a Value,
    pub outputs: &'a HashMap<usize, Value>,
    pub vars: HashMap<String, Value>,
}

impl<'a> BindingContext<'a> {
    pub fn new(input: &'a Value, outputs: &'a HashMap<usize, Value>) -> Self {
        Self { input, outputs, vars: HashMap::new() }
    }

    /// Evaluate one `{...}` expression to a value.
    pub fn resolve(&self, raw: &str) -> Result<Value, String> {
        let inner = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| format!("binding expression {raw:?} is not wrapped in braces"))?
            .trim();

        if let Some(rest) = inner.strip_prefix("step ") {
            let mut parts = rest.splitn(2, '.');
            let index: usize = parts
                .next()
                .unwrap_or("")
                .trim()
                .parse()
                .map_err(|_| format!("malformed step reference {raw:?}"))?;
            let field = parts
                .next()
                .ok_or_else(|| format!("step reference {raw:?} is missing a field path"))?;
            let output = self
                .outputs
                .get(&index)
                .ok_or_else(|| format!("step {index} has not produced an output yet"))?;
            return get_path(output, field)
                .ok_or_else(|| format!("step {index} output has no field {field:?}"));
        }

        let mut parts = inner.splitn(2, '.');
        let head = parts.next().unwrap_or("");
        let rest = parts.next();
        let base = self
            .vars
            .get(head)
            .cloned()
            .or_else(|| self.input.get_field(head).cloned())
            .ok_or_else(|| format!("no binding named {head:?}"))?;
        match rest {
            Some(path) => get_path(&base, path).ok_or_else(|| format!("{head:?} has no field {path:?}")),
            None => Ok(base),
        }
    }

    /// Evaluate a `when step N.field = literal` guard. The left-hand side is
    /// a binding expression, the right-hand side a JSON literal (or a bare
    /// word, treated as a string).
    pub fn resolve_guard(&self, raw: &str) -> Result<bool, String> {
        let (lhs, rhs) = raw
            .split_once('=')
            .ok_or_else(|| format!("malformed guard {raw:?}, expected '<ref> = <literal>'"))?;
        let actual = self.resolve(lhs.trim())?;
        let expected = parse_literal(rhs.trim());
        Ok(actual == expected)
    }

    /// Evaluate a `for v in {expr}` source expression; `v` is always bound
    /// under the fixed name `item` for the duration of the step body, since
    /// the parsed step declaration carries the sequence expression but not
    /// the loop variable's own name (spec.md §6 treats the parsed contract
    /// as opaque structured data beyond `StepDecl`'s fields).
    pub fn resolve_iterate(&self, raw: &str) -> Result<Vec<Value>, String> {
        match self.resolve(raw)? {
            Value::List(items) => Ok(items),
            other => Err(format!("iteration source did not resolve to a list, got {}", other.type_name())),
        }
    }
}

fn get_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match &current {
            Value::Map(_) => current.get_field(segment)?.clone(),
            Value::List(items) => items.get(segment.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn parse_literal(text: &str) -> Value {
    Value::parse_json(text).unwrap_or_else(|_| Value::Str(text.trim_matches('"').to_string()))
}
