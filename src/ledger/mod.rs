//! Idempotency ledger.
//!
//! The ledger is the durable record of every review this system has
//! processed, keyed by `review_id`. It is the only cross-worker coordination
//! point: two workers racing on the same review are separated by the
//! ledger's atomic check-and-insert, never by in-process locking.

mod postgres;

pub use postgres::PgReviewLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::message::ProcessedReview;

/// Ledger failures, classified by how the caller must react
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A record with this review_id already exists
    #[error("review {0} is already recorded")]
    Conflict(String),

    /// Transaction aborted for a reason other than uniqueness
    /// (serialization failure, deadlock); safe to retry
    #[error("retryable persistence conflict: {0}")]
    RetryableConflict(String),

    /// Connectivity or backend failure
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Stored row could not be mapped back to a record
    #[error("invalid ledger record: {0}")]
    InvalidRecord(String),
}

/// A ledger row together with its publish bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub record: ProcessedReview,
    /// When the processed event was confirmed handed to the publisher
    pub published_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

#[async_trait]
pub trait ReviewLedger: Send + Sync {
    /// Look up a review by id.
    async fn lookup(&self, review_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Insert a new record in its own transaction.
    ///
    /// Fails with [`LedgerError::Conflict`] when the review_id is already
    /// present. The transaction is rolled back on every error path.
    async fn insert(&self, record: &ProcessedReview) -> Result<(), LedgerError>;

    /// Record that the processed event for `review_id` was published.
    async fn mark_published(
        &self,
        review_id: &str,
        published_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;
}
