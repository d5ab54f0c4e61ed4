use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::codec::CodecError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("unsupported file {file}: expected one of {accepted}")]
    UnsupportedFile { file: String, accepted: String },

    #[error("session lost: {0}")]
    SessionLost(#[source] LedgerError),

    #[error("stored file could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("ledger write failed: {0}")]
    Storage(#[source] LedgerError),

    #[error("table discovery failed: {0}")]
    Discovery(#[source] ApiError),

    #[error("table substitution failed: {0}")]
    Substitution(#[source] ApiError),

    #[error("no processed document available")]
    NothingToDownload,

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classifies a wizard failure by how the user recovers from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// Input rejected; the user fixes it and tries again on the same step.
    Validation,
    /// Session data missing or unreadable; the user restarts at the form.
    SessionLoss,
    /// A remote service failed; the user re-triggers the action.
    Remote,
    /// Local I/O failed while saving the result.
    Local,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "Validation"),
            FailureKind::SessionLoss => write!(f, "SessionLoss"),
            FailureKind::Remote => write!(f, "Remote"),
            FailureKind::Local => write!(f, "Local"),
        }
    }
}

impl WizardError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WizardError::UnsupportedFile { .. } => FailureKind::Validation,
            WizardError::SessionLost(_)
            | WizardError::Decode(_)
            | WizardError::NothingToDownload => FailureKind::SessionLoss,
            WizardError::Discovery(_) | WizardError::Substitution(_) => FailureKind::Remote,
            WizardError::Storage(_) | WizardError::Io { .. } => FailureKind::Local,
        }
    }
}
