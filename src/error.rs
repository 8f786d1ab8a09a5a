use crate::ledger::LedgerError;
use thiserror::Error;

/// Failure classes that drive a message's disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Body can never be processed; dead-letter without a ledger write
    MalformedInput,
    /// Review already durably recorded; benign
    DuplicateKey,
    /// Persistence conflict unrelated to uniqueness (serialization failure,
    /// deadlock); the only kind eligible for requeue
    RetryableConflict,
    /// A dependency (ledger, broker) is unavailable
    TransientDependency,
    /// Classifier or publisher raised
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::RetryableConflict => "retryable_conflict",
            ErrorKind::TransientDependency => "transient_dependency",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

/// Error raised while moving a review through the processing pipeline
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Malformed review payload: {0}")]
    MalformedInput(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sentiment classification failed: {0:#}")]
    Classifier(anyhow::Error),

    #[error("Event publish failed: {0:#}")]
    Publish(anyhow::Error),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::MalformedInput(_) => ErrorKind::MalformedInput,
            ProcessingError::Ledger(LedgerError::Conflict(_)) => ErrorKind::DuplicateKey,
            ProcessingError::Ledger(LedgerError::RetryableConflict(_)) => {
                ErrorKind::RetryableConflict
            }
            ProcessingError::Ledger(LedgerError::Unavailable(_)) => ErrorKind::TransientDependency,
            ProcessingError::Ledger(LedgerError::InvalidRecord(_)) => ErrorKind::Unexpected,
            ProcessingError::Classifier(_) | ProcessingError::Publish(_) => ErrorKind::Unexpected,
        }
    }
}
