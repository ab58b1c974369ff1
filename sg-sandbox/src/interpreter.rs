//! The structured-expression evaluator. A deadline-checking loop rather
//! than a thread/process watchdog (SPEC_FULL.md §5): the interpreter
//! checks elapsed wall-clock time every few instructions and raises
//! `SandboxTimeout` itself, since there is no child process to kill.

use std::time::{Duration, Instant};

use sg_types::Digest;

use crate::capability::Capability;
use crate::error::{Result, SandboxError};
use crate::program::{Instr, DENIED_BUILTINS, WHITELISTED_MODULES};
use crate::value::Value;
use crate::{builtins, program::Program};

/// How many evaluation steps between deadline checks. Checking every step
/// would make `Instant::now()` dominate runtime on cheap allele bodies;
/// checking too rarely lets a pathological program blow well past its
/// budget before being caught.
const DEADLINE_CHECK_INTERVAL: u64 = 64;

struct Interpreter<'a> {
    digest: Digest,
    capability: &'a dyn Capability,
    deadline: Duration,
    started: Instant,
    steps: u64,
}

type Env = Vec<(String, Value)>;

impl<'a> Interpreter<'a> {
    fn check_deadline(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 && self.started.elapsed() >= self.deadline {
            return Err(SandboxError::Timeout {
                digest: self.digest,
                budget_ms: self.deadline.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn eval(&mut self, instr: &Instr, env: &mut Env) -> Result<Value> {
        self.check_deadline()?;
        match instr {
            Instr::Lit { value } => Ok(Value::from_json(value)),
            Instr::Var { name } => env
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| SandboxError::RuntimeFault {
                    digest: self.digest,
                    detail: format!("unbound name {name:?}"),
                }),
            Instr::Field { of, name } => {
                let v = self.eval(of, env)?;
                v.get_field(name).cloned().ok_or_else(|| SandboxError::RuntimeFault {
                    digest: self.digest,
                    detail: format!("no field {name:?} on a {}", v.type_name()),
                })
            }
            Instr::Import { module } => {
                if WHITELISTED_MODULES.contains(&module.as_str()) {
                    Ok(Value::Null)
                } else {
                    Err(SandboxError::ImportDenied {
                        digest: self.digest,
                        module: module.clone(),
                    })
                }
            }
            Instr::Call { name, args } => {
                if DENIED_BUILTINS.contains(&name.as_str()) {
                    return Err(SandboxError::BuiltinDenied {
                        digest: self.digest,
                        builtin: name.clone(),
                    });
                }
                let values = self.eval_all(args, env)?;
                builtins::call(self.digest, name, &values)
            }
            Instr::Cap { name, args } => {
                let values = self.eval_all(args, env)?;
                self.capability
                    .call(name, &values)
                    .map_err(|detail| SandboxError::RuntimeFault { digest: self.digest, detail })
            }
            Instr::If { cond, then_branch, else_branch } => {
                let c = self.eval(cond, env)?;
                if c.is_truthy() {
                    self.eval(then_branch, env)
                } else {
                    self.eval(else_branch, env)
                }
            }
            Instr::Let { name, value, body } => {
                let v = self.eval(value, env)?;
                env.push((name.clone(), v));
                let result = self.eval(body, env);
                env.pop();
                result
            }
            Instr::Block { exprs } => {
                let mut last = Value::Null;
                for e in exprs {
                    last = self.eval(e, env)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_all(&mut self, instrs: &[Instr], env: &mut Env) -> Result<Vec<Value>> {
        instrs.iter().map(|i| self.eval(i, env)).collect()
    }
}

/// A loaded, ready-to-run allele body.
#[derive(Clone)]
pub struct GeneUnit {
    pub digest: Digest,
    program: std::sync::Arc<Program>,
}

impl GeneUnit {
    pub(crate) fn new(digest: Digest, program: std::sync::Arc<Program>) -> Self {
        Self { digest, program }
    }

    /// Invoke `execute` with `input` (a JSON string) bound as the `input`
    /// variable, under `capability`, within `deadline`. Returns the
    /// rendered JSON output string.
    pub fn execute(&self, input: &str, capability: &dyn Capability, deadline: Duration) -> Result<String> {
        let input_value = Value::parse_json(input).map_err(|e| SandboxError::RuntimeFault {
            digest: self.digest,
            detail: format!("input is not valid JSON: {e}"),
        })?;
        let mut interpreter = Interpreter {
            digest: self.digest,
            capability,
            deadline,
            started: Instant::now(),
            steps: 0,
        };
        let mut env: Env = vec![("input".to_string(), input_value)];
        let result = interpreter.eval(&self.program.execute, &mut env)?;
        Ok(result.render_json())
    }
}
