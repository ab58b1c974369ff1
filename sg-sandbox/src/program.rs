//! The structured-expression subset alleles are written in (SPEC_FULL.md
//! §5's chosen sandbox realization): a small JSON-encoded instruction tree,
//! not a general-purpose language. A `Program` has exactly one entry point,
//! `execute`, matching spec.md §4.C's "single entry point named `execute`
//! taking one string and returning a string".

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Result, SandboxError};

/// Modules an `import` instruction may name. Anything else is
/// `SandboxImportDenied`. Mirrors spec.md §4.C's whitelist: "string
/// processing, hashing, regular expressions, containers, math, date-time,
/// iteration/functional helpers, structural copy".
pub const WHITELISTED_MODULES: &[&str] = &[
    "strings",
    "math",
    "regex",
    "collections",
    "time",
    "hashing",
    "iter",
];

/// Capabilities spec.md §4.C names as explicitly denied, regardless of
/// whitelist membership: "arbitrary code evaluation, dynamic loading of
/// modules outside the whitelist, filesystem open, process input, debugger
/// entry, process exit".
pub const DENIED_BUILTINS: &[&str] = &[
    "eval",
    "dynamic_import",
    "fs_open",
    "proc_spawn",
    "debugger_break",
    "exit",
];

/// One instruction in the expression tree. Deliberately small: no loops,
/// no user-defined functions, no mutation of anything but step-local
/// `let` bindings — the only way an allele affects the world is through a
/// `Cap` call into the injected `gene_sdk` capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    /// A literal JSON value.
    Lit { value: Json },
    /// Reference to a bound name (`input`, or a `let`-bound local).
    Var { name: String },
    /// Field projection on a map-valued expression.
    Field { of: Box<Instr>, name: String },
    /// `module` resolution check; whitelist-gated, otherwise a no-op.
    Import { module: String },
    /// Call to a whitelisted library builtin.
    Call { name: String, args: Vec<Instr> },
    /// Call into the injected capability object.
    Cap { name: String, args: Vec<Instr> },
    If {
        cond: Box<Instr>,
        then_branch: Box<Instr>,
        else_branch: Box<Instr>,
    },
    Let {
        name: String,
        value: Box<Instr>,
        body: Box<Instr>,
    },
    Block { exprs: Vec<Instr> },
}

/// An allele's parsed body: one `execute` expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub execute: Instr,
}

impl Program {
    /// Parse an allele's canonicalised source text (JSON) into a program.
    /// `SgError::MutationEngineFailure`/`LocusExhausted` callers look for a
    /// missing `execute` key specifically (spec.md §4.H: "source that does
    /// not expose an `execute` entry point at load time").
    pub fn parse(source: &str) -> Result<Self> {
        let raw: Json = serde_json::from_str(source)
            .map_err(|e| SandboxError::MalformedProgram(e.to_string()))?;
        let Json::Object(ref map) = raw else {
            return Err(SandboxError::MalformedProgram(
                "program document must be a JSON object".to_string(),
            ));
        };
        let execute_json = map.get("execute").ok_or(SandboxError::MissingEntryPoint)?;
        let execute: Instr = serde_json::from_value(execute_json.clone())
            .map_err(|e| SandboxError::MalformedProgram(e.to_string()))?;
        Ok(Self { execute })
    }
}
