//! Component E: risk policy, transaction undo-logs, and shadow/canary
//! qualification (spec.md §4.E).

pub mod error;
mod policy;
mod qualification;
mod transaction;

pub use error::{Result, SafetyError};
pub use policy::{policy_for, RiskPolicy};
pub use qualification::{QualificationConfig, QualificationStage, QualificationTracker};
pub use transaction::{CapabilityTable, InverseBuilder, Transaction, TransactionalCapability};
