//! The whitelisted builtin library: string processing, math, hashing,
//! regular expressions, containers, date-time, a small iteration set, and
//! structural copy — the categories spec.md §4.C enumerates. Anything not
//! listed here is a `SandboxRuntimeFault` (an unrecognized call is a
//! program error, not a denial); `DENIED_BUILTINS` in `program.rs` is
//! checked by the interpreter before this function is ever reached.

use sha2::{Digest as _, Sha256};
use sg_types::Digest;

use crate::error::{Result, SandboxError};
use crate::value::Value;

pub fn call(digest: Digest, name: &str, args: &[Value]) -> Result<Value> {
    match name {
        // strings
        "upper" => str_arg(digest, args, 0).map(|s| Value::Str(s.to_uppercase())),
        "lower" => str_arg(digest, args, 0).map(|s| Value::Str(s.to_lowercase())),
        "trim" => str_arg(digest, args, 0).map(|s| Value::Str(s.trim().to_string())),
        "concat" => {
            let mut out = String::new();
            for a in args {
                out.push_str(&render_as_text(a));
            }
            Ok(Value::Str(out))
        }
        "split" => {
            let s = str_arg(digest, args, 0)?;
            let sep = str_arg(digest, args, 1)?;
            Ok(Value::List(
                s.split(sep).map(|p| Value::Str(p.to_string())).collect(),
            ))
        }
        "join" => {
            let list = list_arg(digest, args, 0)?;
            let sep = str_arg(digest, args, 1)?;
            let parts: Vec<String> = list.iter().map(render_as_text).collect();
            Ok(Value::Str(parts.join(sep)))
        }
        "replace" => {
            let s = str_arg(digest, args, 0)?;
            let from = str_arg(digest, args, 1)?;
            let to = str_arg(digest, args, 2)?;
            Ok(Value::Str(s.replace(from, to)))
        }
        "len" => match args.first() {
            Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::List(l)) => Ok(Value::Int(l.len() as i64)),
            Some(Value::Map(m)) => Ok(Value::Int(m.len() as i64)),
            _ => fault(digest, "len expects a string, list, or map"),
        },
        "contains" => {
            let s = str_arg(digest, args, 0)?;
            let needle = str_arg(digest, args, 1)?;
            Ok(Value::Bool(s.contains(needle)))
        }
        "starts_with" => {
            let s = str_arg(digest, args, 0)?;
            let prefix = str_arg(digest, args, 1)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "ends_with" => {
            let s = str_arg(digest, args, 0)?;
            let suffix = str_arg(digest, args, 1)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }

        // math
        "add" => binary_f64(digest, args, |a, b| a + b),
        "sub" => binary_f64(digest, args, |a, b| a - b),
        "mul" => binary_f64(digest, args, |a, b| a * b),
        "div" => {
            let (a, b) = (float_arg(digest, args, 0)?, float_arg(digest, args, 1)?);
            if b == 0.0 {
                return fault(digest, "division by zero");
            }
            Ok(numeric(a / b))
        }
        "modulo" => {
            let (a, b) = (float_arg(digest, args, 0)?, float_arg(digest, args, 1)?);
            if b == 0.0 {
                return fault(digest, "modulo by zero");
            }
            Ok(numeric(a % b))
        }
        "min" => binary_f64(digest, args, f64::min),
        "max" => binary_f64(digest, args, f64::max),
        "abs" => float_arg(digest, args, 0).map(|f| numeric(f.abs())),
        "round" => float_arg(digest, args, 0).map(|f| Value::Int(f.round() as i64)),
        "floor" => float_arg(digest, args, 0).map(|f| Value::Int(f.floor() as i64)),
        "ceil" => float_arg(digest, args, 0).map(|f| Value::Int(f.ceil() as i64)),

        // hashing
        "sha256" => {
            let s = str_arg(digest, args, 0)?;
            let mut hasher = Sha256::new();
            hasher.update(s.as_bytes());
            Ok(Value::Str(hex::encode(hasher.finalize())))
        }

        // regex
        "regex_match" => {
            let s = str_arg(digest, args, 0)?;
            let pattern = str_arg(digest, args, 1)?;
            let re = regex::Regex::new(pattern)
                .map_err(|e| SandboxError::RuntimeFault { digest, detail: format!("invalid regex: {e}") })?;
            Ok(Value::Bool(re.is_match(s)))
        }
        "regex_replace" => {
            let s = str_arg(digest, args, 0)?;
            let pattern = str_arg(digest, args, 1)?;
            let to = str_arg(digest, args, 2)?;
            let re = regex::Regex::new(pattern)
                .map_err(|e| SandboxError::RuntimeFault { digest, detail: format!("invalid regex: {e}") })?;
            Ok(Value::Str(re.replace_all(s, to).into_owned()))
        }

        // containers
        "list_get" => {
            let list = list_arg(digest, args, 0)?;
            let idx = int_arg(digest, args, 1)?;
            Ok(list
                .get(usize::try_from(idx).unwrap_or(usize::MAX))
                .cloned()
                .unwrap_or(Value::Null))
        }
        "list_push" => {
            let mut list = list_arg(digest, args, 0)?.clone();
            list.push(args.get(1).cloned().unwrap_or(Value::Null));
            Ok(Value::List(list))
        }
        "list_len" => list_arg(digest, args, 0).map(|l| Value::Int(l.len() as i64)),
        "list_reverse" => {
            let mut list = list_arg(digest, args, 0)?.clone();
            list.reverse();
            Ok(Value::List(list))
        }
        "list_sort" => {
            let mut list = list_arg(digest, args, 0)?.clone();
            list.sort_by(|a, b| render_as_text(a).cmp(&render_as_text(b)));
            Ok(Value::List(list))
        }
        "list_unique" => {
            let list = list_arg(digest, args, 0)?;
            let mut seen = std::collections::BTreeSet::new();
            let mut out = Vec::new();
            for v in list {
                let key = render_as_text(v);
                if seen.insert(key) {
                    out.push(v.clone());
                }
            }
            Ok(Value::List(out))
        }
        "list_sum" => {
            let list = list_arg(digest, args, 0)?;
            let mut total = 0.0;
            for v in list {
                total += v
                    .as_float()
                    .ok_or_else(|| SandboxError::RuntimeFault {
                        digest,
                        detail: "list_sum expects a list of numbers".to_string(),
                    })?;
            }
            Ok(numeric(total))
        }
        "list_count" => list_arg(digest, args, 0).map(|l| Value::Int(l.len() as i64)),
        "map_get" => {
            let m = map_arg(digest, args, 0)?;
            let key = str_arg(digest, args, 1)?;
            Ok(m.get(key).cloned().unwrap_or(Value::Null))
        }
        "map_set" => {
            let mut m = map_arg(digest, args, 0)?.clone();
            let key = str_arg(digest, args, 1)?.to_string();
            m.insert(key, args.get(2).cloned().unwrap_or(Value::Null));
            Ok(Value::Map(m))
        }
        "map_has" => {
            let m = map_arg(digest, args, 0)?;
            let key = str_arg(digest, args, 1)?;
            Ok(Value::Bool(m.contains_key(key)))
        }
        "map_keys" => {
            let m = map_arg(digest, args, 0)?;
            Ok(Value::List(m.keys().map(|k| Value::Str(k.clone())).collect()))
        }

        // date-time
        "now_millis" => Ok(Value::Int(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
        )),

        // structural copy
        "clone" => args.first().cloned().ok_or_else(|| SandboxError::RuntimeFault {
            digest,
            detail: "clone expects one argument".to_string(),
        }),

        other => fault(digest, &format!("unknown builtin {other:?}")),
    }
}

fn fault<T>(digest: Digest, detail: &str) -> Result<T> {
    Err(SandboxError::RuntimeFault {
        digest,
        detail: detail.to_string(),
    })
}

fn str_arg<'a>(digest: Digest, args: &'a [Value], idx: usize) -> Result<&'a str> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| SandboxError::RuntimeFault {
            digest,
            detail: format!("expected string argument at position {idx}"),
        })
}

fn int_arg(digest: Digest, args: &[Value], idx: usize) -> Result<i64> {
    args.get(idx)
        .and_then(Value::as_int)
        .ok_or_else(|| SandboxError::RuntimeFault {
            digest,
            detail: format!("expected int argument at position {idx}"),
        })
}

fn float_arg(digest: Digest, args: &[Value], idx: usize) -> Result<f64> {
    args.get(idx)
        .and_then(Value::as_float)
        .ok_or_else(|| SandboxError::RuntimeFault {
            digest,
            detail: format!("expected numeric argument at position {idx}"),
        })
}

fn list_arg<'a>(digest: Digest, args: &'a [Value], idx: usize) -> Result<&'a Vec<Value>> {
    match args.get(idx) {
        Some(Value::List(l)) => Ok(l),
        _ => Err(SandboxError::RuntimeFault {
            digest,
            detail: format!("expected list argument at position {idx}"),
        }),
    }
}

fn map_arg<'a>(
    digest: Digest,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a std::collections::BTreeMap<String, Value>> {
    match args.get(idx) {
        Some(Value::Map(m)) => Ok(m),
        _ => Err(SandboxError::RuntimeFault {
            digest,
            detail: format!("expected map argument at position {idx}"),
        }),
    }
}

fn binary_f64(digest: Digest, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let a = float_arg(digest, args, 0)?;
    let b = float_arg(digest, args, 1)?;
    Ok(numeric(f(a, b)))
}

fn numeric(v: f64) -> Value {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
        Value::Int(v as i64)
    } else {
        Value::Float(v)
    }
}

fn render_as_text(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => other.render_json(),
    }
}
