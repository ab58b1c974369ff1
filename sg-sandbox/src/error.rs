use sg_types::{Digest, SgError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("allele source is not a valid program document: {0}")]
    MalformedProgram(String),

    #[error("allele has no `execute` entry point")]
    MissingEntryPoint,

    #[error("{digest} attempted to import non-whitelisted module {module:?}")]
    ImportDenied { digest: Digest, module: String },

    #[error("{digest} attempted to call denied builtin {builtin:?}")]
    BuiltinDenied { digest: Digest, builtin: String },

    #[error("{digest} exceeded its {budget_ms}ms execution deadline")]
    Timeout { digest: Digest, budget_ms: u64 },

    #[error("{digest} faulted: {detail}")]
    RuntimeFault { digest: Digest, detail: String },
}

impl SandboxError {
    pub fn digest(&self) -> Option<Digest> {
        match self {
            SandboxError::ImportDenied { digest, .. }
            | SandboxError::BuiltinDenied { digest, .. }
            | SandboxError::Timeout { digest, .. }
            | SandboxError::RuntimeFault { digest, .. } => Some(*digest),
            _ => None,
        }
    }
}

impl From<SandboxError> for SgError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::ImportDenied { digest, module } => {
                SgError::SandboxImportDenied { digest, module }
            }
            SandboxError::BuiltinDenied { digest, builtin } => {
                SgError::SandboxBuiltinDenied { digest, builtin }
            }
            SandboxError::Timeout { digest, budget_ms } => {
                SgError::SandboxTimeout { digest, budget_ms }
            }
            SandboxError::RuntimeFault { digest, detail } => {
                SgError::SandboxRuntimeFault { digest, detail }
            }
            SandboxError::MalformedProgram(detail) => SgError::SandboxRuntimeFault {
                digest: Digest::from_bytes([0u8; 32]),
                detail,
            },
            SandboxError::MissingEntryPoint => SgError::SandboxRuntimeFault {
                digest: Digest::from_bytes([0u8; 32]),
                detail: "missing execute entry point".to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
