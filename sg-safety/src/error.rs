use thiserror::Error;

use sg_types::SgError;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("capability refused operation {operation:?}: protected resource")]
    ProtectedResource { operation: String },
    #[error("rollback left {failed} of {total} inverses unresolved")]
    Incomplete { failed: usize, total: usize },
}

impl From<SafetyError> for SgError {
    fn from(e: SafetyError) -> Self {
        match e {
            SafetyError::ProtectedResource { operation } => SgError::ProtectedResource { operation },
            SafetyError::Incomplete { failed, total } => SgError::TransactionIncomplete {
                failed_inverses: failed,
                total_inverses: total,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SafetyError>;
