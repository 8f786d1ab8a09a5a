use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{LedgerEntry, LedgerError, ReviewLedger};
use crate::db::DbPool;
use crate::message::ProcessedReview;

/// SQLSTATEs that abort a transaction without meaning "already recorded":
/// 40001 serialization_failure, 40P01 deadlock_detected
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01"];

#[derive(Debug, sqlx::FromRow)]
struct ProcessedReviewRow {
    review_id: String,
    product_id: String,
    user_id: String,
    rating: i32,
    comment: String,
    sentiment: String,
    processed_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProcessedReviewRow> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: ProcessedReviewRow) -> Result<Self, Self::Error> {
        let sentiment = row
            .sentiment
            .parse()
            .map_err(|e| LedgerError::InvalidRecord(format!("{}: {}", row.review_id, e)))?;

        Ok(LedgerEntry {
            record: ProcessedReview {
                review_id: row.review_id,
                product_id: row.product_id,
                user_id: row.user_id,
                rating: row.rating,
                comment: row.comment,
                sentiment,
                processed_at: row.processed_at,
            },
            published_at: row.published_at,
        })
    }
}

/// Postgres-backed ledger.
///
/// The `processed_reviews.review_id` primary key is the atomic
/// check-and-insert: whichever transaction commits first wins, every other
/// insert for the same id fails with a unique violation.
#[derive(Clone)]
pub struct PgReviewLedger {
    pool: DbPool,
}

impl PgReviewLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewLedger for PgReviewLedger {
    async fn lookup(&self, review_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query_as::<_, ProcessedReviewRow>(
            r#"
            SELECT review_id, product_id, user_id, rating, comment, sentiment,
                   processed_at, published_at
            FROM processed_reviews
            WHERE review_id = $1
            "#,
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify_sqlx_error(e, review_id))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn insert(&self, record: &ProcessedReview) -> Result<(), LedgerError> {
        // Dropping `tx` without commit rolls back, so every early return
        // below releases the connection with the transaction aborted.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify_sqlx_error(e, &record.review_id))?;

        sqlx::query(
            r#"
            INSERT INTO processed_reviews
                (review_id, product_id, user_id, rating, comment, sentiment, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.review_id)
        .bind(&record.product_id)
        .bind(&record.user_id)
        .bind(record.rating)
        .bind(&record.comment)
        .bind(record.sentiment.as_str())
        .bind(record.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_sqlx_error(e, &record.review_id))?;

        tx.commit()
            .await
            .map_err(|e| classify_sqlx_error(e, &record.review_id))?;

        debug!(review_id = %record.review_id, "Ledger insert committed");
        Ok(())
    }

    async fn mark_published(
        &self,
        review_id: &str,
        published_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE processed_reviews
            SET published_at = $2
            WHERE review_id = $1 AND published_at IS NULL
            "#,
        )
        .bind(review_id)
        .bind(published_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_sqlx_error(e, review_id))?;

        Ok(())
    }
}

fn classify_sqlx_error(err: sqlx::Error, review_id: &str) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return LedgerError::Conflict(review_id.to_string());
        }
        if let Some(code) = db_err.code() {
            if RETRYABLE_SQLSTATES.iter().any(|retryable| *retryable == code) {
                return LedgerError::RetryableConflict(format!(
                    "SQLSTATE {}: {}",
                    code,
                    db_err.message()
                ));
            }
        }
    }

    LedgerError::Unavailable(err.to_string())
}
