use crate::error::ErrorKind;
use std::fmt;

/// Terminal verdict for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Positive acknowledgement; the delivery is done
    Ack,
    /// Dead-letter the delivery; it is never redelivered by the broker
    RejectNoRequeue,
    /// Hand the delivery back for another attempt
    NackRequeue,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::RejectNoRequeue => "reject",
            Disposition::NackRequeue => "requeue",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disposition for a delivery whose processing stopped with an error.
///
/// | kind                | disposition                                  |
/// |---------------------|----------------------------------------------|
/// | MalformedInput      | REJECT_NO_REQUEUE                            |
/// | DuplicateKey        | ACK (already durably recorded)               |
/// | RetryableConflict   | NACK_REQUEUE while `attempt < max_attempts`, |
/// |                     | then REJECT_NO_REQUEUE                       |
/// | TransientDependency | REJECT_NO_REQUEUE                            |
/// | Unexpected          | REJECT_NO_REQUEUE                            |
///
/// `attempt` is 1-based: the first delivery of a message is attempt 1.
pub fn disposition_for_error(kind: ErrorKind, attempt: u32, max_attempts: u32) -> Disposition {
    match kind {
        ErrorKind::DuplicateKey => Disposition::Ack,
        ErrorKind::RetryableConflict if attempt < max_attempts => Disposition::NackRequeue,
        ErrorKind::RetryableConflict
        | ErrorKind::MalformedInput
        | ErrorKind::TransientDependency
        | ErrorKind::Unexpected => Disposition::RejectNoRequeue,
    }
}
