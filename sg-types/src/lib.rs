//! Shared vocabulary for the evolutionary function runtime: content digests,
//! the clock seam, the aggregated error enum, and the parsed contract value.
//! Every other `sg-*` crate depends on this one and nothing else in the
//! workspace; it owns no I/O and no business logic.

pub mod contract;
pub mod digest;
pub mod error;
pub mod time;

pub use contract::{Contract, ContractKind, ContractParseError, FailurePolicy, Family, Param, RiskClass, ScalarType, StepDecl};
pub use digest::{canonicalise, Digest};
pub use error::SgError;
pub use time::{Clock, SystemClock, Timestamp};
