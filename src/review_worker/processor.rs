// ============================================================================
// Review Processor
// ============================================================================
//
// Per-delivery state machine:
//
//   RECEIVED -> PARSED -> DUPLICATE_CHECKED -> CLASSIFIED -> PERSISTED
//            -> PUBLISHED -> ACKED
//
// with an early exit to REJECTED or RETRY from any step. The processor never
// touches the transport; it returns a ProcessOutcome whose disposition the
// dispatch loop applies.
//
// Guarantees (under at-least-once delivery):
// - at most one ledger record per review_id (the ledger's unique key decides
//   cross-worker races)
// - publish happens only after the insert transaction committed
// - an already-published record is never published again
//
// Publish gap: a record whose publish failed (or whose worker died between
// commit and publish) carries no published_at. When such a record is older
// than the republish grace period and its review is delivered again, the
// event is republished from the stored record. The duplicate path always
// ACKs; a failed republish leaves the record unpublished for the next
// redelivery.
//
// Duplicate-publish window: when the publish succeeds but mark_published
// fails, published_at stays NULL. A redelivery after the grace period then
// publishes the same event (same reviewId and processedTimestamp) again.
//
// ============================================================================

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::disposition::{Disposition, disposition_for_error};
use super::transport::Delivery;
use crate::config::{LoggingConfig, WorkerConfig};
use crate::error::{ErrorKind, ProcessingError};
use crate::ledger::{LedgerEntry, ReviewLedger};
use crate::message::{InboundReview, ProcessedEvent, ProcessedReview};
use crate::metrics;
use crate::publisher::EventPublisher;
use crate::sentiment::SentimentClassifier;
use crate::utils::user_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Received,
    Parsed,
    DuplicateChecked,
    Classified,
    Persisted,
    Published,
    Acked,
    Rejected,
    Retry,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Received => "received",
            ProcessingState::Parsed => "parsed",
            ProcessingState::DuplicateChecked => "duplicate_checked",
            ProcessingState::Classified => "classified",
            ProcessingState::Persisted => "persisted",
            ProcessingState::Published => "published",
            ProcessingState::Acked => "acked",
            ProcessingState::Rejected => "rejected",
            ProcessingState::Retry => "retry",
        }
    }
}

/// How a delivery was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Classified, persisted and published on this delivery
    Processed,
    /// Already in the ledger; nothing published on this delivery
    Duplicate,
    /// Lost the insert race to another worker
    RaceConflict,
    /// Found persisted but never published; the event was published now
    Republished,
    Failed(ErrorKind),
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Processed => "processed",
            Resolution::Duplicate => "duplicate",
            Resolution::RaceConflict => "race_conflict",
            Resolution::Republished => "republished",
            Resolution::Failed(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub disposition: Disposition,
    pub resolution: Resolution,
    /// Known once the body parsed
    pub review_id: Option<String>,
    /// Last step reached before the terminal state
    pub last_state: ProcessingState,
    pub final_state: ProcessingState,
    /// Error text, for dead-letter metadata and logs
    pub reason: Option<String>,
}

/// Progress of one delivery through the state machine
struct Progress<'a> {
    delivery_id: &'a str,
    review_id: Option<String>,
    state: ProcessingState,
}

impl<'a> Progress<'a> {
    fn new(delivery_id: &'a str) -> Self {
        Self {
            delivery_id,
            review_id: None,
            state: ProcessingState::Received,
        }
    }

    fn advance(&mut self, next: ProcessingState) {
        debug!(
            delivery_id = %self.delivery_id,
            review_id = self.review_id.as_deref().unwrap_or(""),
            from = self.state.as_str(),
            to = next.as_str(),
            "Review state transition"
        );
        self.state = next;
    }
}

pub struct ReviewProcessor {
    ledger: Arc<dyn ReviewLedger>,
    classifier: Arc<dyn SentimentClassifier>,
    publisher: Arc<dyn EventPublisher>,
    config: WorkerConfig,
    logging: LoggingConfig,
}

impl ReviewProcessor {
    pub fn new(
        ledger: Arc<dyn ReviewLedger>,
        classifier: Arc<dyn SentimentClassifier>,
        publisher: Arc<dyn EventPublisher>,
        config: WorkerConfig,
        logging: LoggingConfig,
    ) -> Self {
        Self {
            ledger,
            classifier,
            publisher,
            config,
            logging,
        }
    }

    /// Run one delivery through the state machine and decide its disposition.
    ///
    /// Infallible by construction: every failure is folded into the outcome.
    pub async fn process(&self, delivery: &Delivery) -> ProcessOutcome {
        let started = Instant::now();
        metrics::REVIEW_MESSAGES_RECEIVED.inc();

        let mut progress = Progress::new(&delivery.delivery_id);
        let result = self.run(delivery, &mut progress).await;
        let last_state = progress.state;

        let outcome = match result {
            Ok(resolution) => ProcessOutcome {
                disposition: Disposition::Ack,
                resolution,
                review_id: progress.review_id,
                last_state,
                final_state: ProcessingState::Acked,
                reason: None,
            },
            Err(err) => {
                let kind = err.kind();
                let disposition = disposition_for_error(
                    kind,
                    delivery.attempt,
                    self.config.max_requeue_attempts,
                );
                let resolution = match kind {
                    ErrorKind::DuplicateKey => Resolution::RaceConflict,
                    other => Resolution::Failed(other),
                };
                let final_state = match disposition {
                    Disposition::Ack => ProcessingState::Acked,
                    Disposition::RejectNoRequeue => ProcessingState::Rejected,
                    Disposition::NackRequeue => ProcessingState::Retry,
                };
                ProcessOutcome {
                    disposition,
                    resolution,
                    review_id: progress.review_id,
                    last_state,
                    final_state,
                    reason: Some(err.to_string()),
                }
            }
        };

        self.log_outcome(delivery, &outcome);
        metrics::REVIEW_DISPOSITIONS
            .with_label_values(&[outcome.disposition.as_str(), outcome.resolution.as_str()])
            .inc();
        metrics::REVIEW_PROCESSING_TIME.observe(started.elapsed().as_secs_f64());

        outcome
    }

    async fn run(
        &self,
        delivery: &Delivery,
        progress: &mut Progress<'_>,
    ) -> Result<Resolution, ProcessingError> {
        let review = InboundReview::parse(&delivery.payload)?;
        progress.review_id = Some(review.review_id.clone());
        progress.advance(ProcessingState::Parsed);

        let existing = self.ledger.lookup(&review.review_id).await?;
        progress.advance(ProcessingState::DuplicateChecked);
        if let Some(entry) = existing {
            return Ok(self.resolve_duplicate(entry).await);
        }

        let sentiment = self
            .classifier
            .classify(&review.comment)
            .map_err(ProcessingError::Classifier)?;
        progress.advance(ProcessingState::Classified);

        let record = ProcessedReview::new(review, sentiment, Utc::now());
        self.ledger.insert(&record).await?;
        progress.advance(ProcessingState::Persisted);

        self.publish_and_mark(&record).await?;
        progress.advance(ProcessingState::Published);

        debug!(
            review_id = %record.review_id,
            user = %user_label(&record.user_id, &self.logging),
            sentiment = %record.sentiment,
            "Review classified and recorded"
        );
        Ok(Resolution::Processed)
    }

    async fn resolve_duplicate(&self, entry: LedgerEntry) -> Resolution {
        if entry.is_published() {
            return Resolution::Duplicate;
        }

        let age = Utc::now() - entry.record.processed_at;
        if age < Duration::seconds(self.config.republish_grace_secs) {
            // Unpublished within the grace period: treated as in flight elsewhere
            return Resolution::Duplicate;
        }

        warn!(
            review_id = %entry.record.review_id,
            age_secs = age.num_seconds(),
            "Ledger record was never published, republishing event"
        );
        match self.publish_and_mark(&entry.record).await {
            Ok(()) => Resolution::Republished,
            Err(e) => {
                warn!(
                    review_id = %entry.record.review_id,
                    backend = self.publisher.backend(),
                    error = %e,
                    "Republish failed, acknowledging duplicate"
                );
                Resolution::Duplicate
            }
        }
    }

    async fn publish_and_mark(&self, record: &ProcessedReview) -> Result<(), ProcessingError> {
        let event = ProcessedEvent::from_record(record);
        self.publisher
            .publish(&event)
            .await
            .map_err(ProcessingError::Publish)?;

        // On failure published_at stays NULL and the record remains eligible for republish
        if let Err(e) = self.ledger.mark_published(&record.review_id, Utc::now()).await {
            warn!(
                review_id = %record.review_id,
                backend = self.publisher.backend(),
                error = %e,
                "Event published but ledger record not marked as published"
            );
        }
        Ok(())
    }

    fn log_outcome(&self, delivery: &Delivery, outcome: &ProcessOutcome) {
        let review_id = outcome.review_id.as_deref().unwrap_or("");
        let reason = outcome.reason.as_deref().unwrap_or("");

        match outcome.resolution {
            Resolution::Processed | Resolution::Republished => info!(
                delivery_id = %delivery.delivery_id,
                review_id = %review_id,
                resolution = outcome.resolution.as_str(),
                disposition = %outcome.disposition,
                "Review processed"
            ),
            Resolution::Duplicate | Resolution::RaceConflict => info!(
                delivery_id = %delivery.delivery_id,
                review_id = %review_id,
                resolution = outcome.resolution.as_str(),
                "Review already recorded, acknowledging"
            ),
            Resolution::Failed(ErrorKind::MalformedInput) => warn!(
                delivery_id = %delivery.delivery_id,
                attempt = delivery.attempt,
                error = %reason,
                "Malformed review payload, dead-lettering"
            ),
            Resolution::Failed(kind) if outcome.disposition == Disposition::NackRequeue => warn!(
                delivery_id = %delivery.delivery_id,
                review_id = %review_id,
                kind = kind.as_str(),
                stage = outcome.last_state.as_str(),
                attempt = delivery.attempt,
                max_attempts = self.config.max_requeue_attempts,
                error = %reason,
                "Retryable persistence conflict, requeueing"
            ),
            Resolution::Failed(kind) => error!(
                delivery_id = %delivery.delivery_id,
                review_id = %review_id,
                kind = kind.as_str(),
                stage = outcome.last_state.as_str(),
                attempt = delivery.attempt,
                disposition = %outcome.disposition,
                error = %reason,
                "Review processing failed, dead-lettering"
            ),
        }
    }
}
