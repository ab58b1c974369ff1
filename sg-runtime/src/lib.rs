//! Process-wide wiring, configuration, and lifecycle for the evolutionary
//! function runtime: the glue that constructs the eight components
//! (registry, phenotype map, sandbox loader, arena, safety, pathway
//! executor, fusion tracker, mutation orchestration) against one project
//! root and exposes them as a single handle, per spec.md §9.

mod config;
mod error;
mod handle;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use handle::SgHandle;

pub use sg_pathway::{ExecutionContext, PathwayResult, StepOutcome, StepStatus};
