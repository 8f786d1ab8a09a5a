// ============================================================================
// Review Message Types
// ============================================================================
//
// InboundReview   - untrusted payload decoded from the review stream
// ProcessedReview - the ledger record, created at most once per review_id
// ProcessedEvent  - what downstream consumers receive after a commit
//
// ============================================================================

use crate::error::ProcessingError;
use crate::sentiment::Sentiment;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Review payload as published by upstream producers.
///
/// Wire format:
/// `{reviewId, productId, userId, rating, comment, timestamp?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReview {
    pub review_id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i32,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundReview {
    /// Decode and validate a raw message body.
    ///
    /// Every failure here is permanent: the body will never parse no matter
    /// how many times it is redelivered.
    pub fn parse(body: &[u8]) -> Result<Self, ProcessingError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid JSON: {}", e)))?;

        // serde would happily accept a positional array for a struct
        if !value.is_object() {
            return Err(ProcessingError::MalformedInput(
                "payload is not a JSON object".to_string(),
            ));
        }

        let review: InboundReview = serde_json::from_value(value)
            .map_err(|e| ProcessingError::MalformedInput(e.to_string()))?;

        review.validate()?;
        Ok(review)
    }

    fn validate(&self) -> Result<(), ProcessingError> {
        for (field, value) in [
            ("reviewId", &self.review_id),
            ("productId", &self.product_id),
            ("userId", &self.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(ProcessingError::MalformedInput(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Ledger record for a review that has been classified and persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedReview {
    pub review_id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i32,
    pub comment: String,
    pub sentiment: Sentiment,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedReview {
    pub fn new(review: InboundReview, sentiment: Sentiment, processed_at: DateTime<Utc>) -> Self {
        Self {
            review_id: review.review_id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            comment: review.comment,
            sentiment,
            processed_at,
        }
    }
}

/// Event emitted downstream once a review has been committed.
///
/// Wire format: `{reviewId, sentiment, processedTimestamp}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub review_id: String,
    pub sentiment: Sentiment,
    pub processed_timestamp: String,
}

impl ProcessedEvent {
    pub fn from_record(record: &ProcessedReview) -> Self {
        Self {
            review_id: record.review_id.clone(),
            sentiment: record.sentiment,
            processed_timestamp: record
                .processed_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
