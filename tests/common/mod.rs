// ============================================================================
// In-memory collaborators for review worker tests
// ============================================================================

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_sentiment_worker::config::{LoggingConfig, WorkerConfig};
use review_sentiment_worker::ledger::{LedgerEntry, LedgerError, ReviewLedger};
use review_sentiment_worker::message::{ProcessedEvent, ProcessedReview};
use review_sentiment_worker::publisher::EventPublisher;
use review_sentiment_worker::review_worker::{Delivery, DeliveryTransport, ReviewProcessor};
use review_sentiment_worker::sentiment::{LexiconClassifier, Sentiment, SentimentClassifier};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn review_json(review_id: &str, comment: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "reviewId": review_id,
        "productId": "p1",
        "userId": "u1",
        "rating": 5,
        "comment": comment,
    }))
    .unwrap()
}

pub fn stored_review(review_id: &str, processed_at: DateTime<Utc>) -> ProcessedReview {
    ProcessedReview {
        review_id: review_id.to_string(),
        product_id: "p1".to_string(),
        user_id: "u1".to_string(),
        rating: 4,
        comment: "good".to_string(),
        sentiment: Sentiment::Positive,
        processed_at,
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFault {
    Unavailable,
    RetryableConflict,
    /// Another worker commits the same review between lookup and insert
    LostRace,
}

#[derive(Debug, Default, Clone)]
pub struct LedgerFaults {
    pub lookup_unavailable: bool,
    pub insert: Option<InsertFault>,
    pub mark_published_fails: bool,
}

#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
    faults: Mutex<LedgerFaults>,
    inserts: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_faults(faults: LedgerFaults) -> Arc<Self> {
        let ledger = Self::default();
        *ledger.faults.lock().unwrap() = faults;
        Arc::new(ledger)
    }

    pub fn set_faults(&self, faults: LedgerFaults) {
        *self.faults.lock().unwrap() = faults;
    }

    pub fn seed(&self, record: ProcessedReview, published_at: Option<DateTime<Utc>>) {
        self.entries.lock().unwrap().insert(
            record.review_id.clone(),
            LedgerEntry {
                record,
                published_at,
            },
        );
    }

    pub fn get(&self, review_id: &str) -> Option<LedgerEntry> {
        self.entries.lock().unwrap().get(review_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Inserts performed by the worker under test
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewLedger for InMemoryLedger {
    async fn lookup(&self, review_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        if self.faults.lock().unwrap().lookup_unavailable {
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        Ok(self.get(review_id))
    }

    async fn insert(&self, record: &ProcessedReview) -> Result<(), LedgerError> {
        let fault = self.faults.lock().unwrap().insert;
        match fault {
            Some(InsertFault::Unavailable) => {
                return Err(LedgerError::Unavailable("connection reset".to_string()));
            }
            Some(InsertFault::RetryableConflict) => {
                return Err(LedgerError::RetryableConflict(
                    "SQLSTATE 40001: could not serialize access".to_string(),
                ));
            }
            Some(InsertFault::LostRace) => {
                self.seed(record.clone(), Some(Utc::now()));
                return Err(LedgerError::Conflict(record.review_id.clone()));
            }
            None => {}
        }

        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&record.review_id) {
            return Err(LedgerError::Conflict(record.review_id.clone()));
        }
        entries.insert(
            record.review_id.clone(),
            LedgerEntry {
                record: record.clone(),
                published_at: None,
            },
        );
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_published(
        &self,
        review_id: &str,
        published_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.faults.lock().unwrap().mark_published_fails {
            return Err(LedgerError::Unavailable("connection reset".to_string()));
        }
        if let Some(entry) = self.entries.lock().unwrap().get_mut(review_id) {
            entry.published_at.get_or_insert(published_at);
        }
        Ok(())
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ProcessedEvent>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ProcessedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, event: &ProcessedEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broker closed channel");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Classifier
// ============================================================================

pub struct FailingClassifier;

impl SentimentClassifier for FailingClassifier {
    fn classify(&self, _text: &str) -> Result<Sentiment> {
        anyhow::bail!("model not loaded")
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Queue-backed transport recording every settlement.
///
/// Sets `shutdown` once a fetch finds the queue empty, so a dispatch loop
/// over it stops after draining.
pub struct InMemoryTransport {
    queue: VecDeque<Delivery>,
    next_id: u64,
    shutdown: Arc<AtomicBool>,
    pub acked: Vec<String>,
    pub rejected: Vec<(Delivery, String)>,
    pub requeued: Vec<Delivery>,
    /// Fail this many acks before succeeding
    pub failing_acks: usize,
    pub declared: bool,
}

impl InMemoryTransport {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 0,
            shutdown,
            acked: Vec::new(),
            rejected: Vec::new(),
            requeued: Vec::new(),
            failing_acks: 0,
            declared: false,
        }
    }

    pub fn push(&mut self, payload: Vec<u8>) -> String {
        self.push_attempt(payload, 1)
    }

    fn push_attempt(&mut self, payload: Vec<u8>, attempt: u32) -> String {
        self.next_id += 1;
        let id = format!("{}-0", self.next_id);
        self.queue
            .push_back(Delivery::new(id.clone(), payload).with_attempt(attempt));
        id
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[async_trait]
impl DeliveryTransport for InMemoryTransport {
    async fn declare_topology(&mut self) -> Result<()> {
        self.declared = true;
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Option<Delivery>> {
        let next = self.queue.pop_front();
        if next.is_none() {
            self.shutdown.store(true, Ordering::SeqCst);
        }
        Ok(next)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        if self.failing_acks > 0 {
            self.failing_acks -= 1;
            anyhow::bail!("connection reset by peer");
        }
        self.acked.push(delivery.delivery_id.clone());
        Ok(())
    }

    async fn reject(&mut self, delivery: &Delivery, reason: &str) -> Result<()> {
        self.rejected.push((delivery.clone(), reason.to_string()));
        Ok(())
    }

    async fn requeue(&mut self, delivery: &Delivery) -> Result<()> {
        self.requeued.push(delivery.clone());
        self.push_attempt(delivery.payload.clone(), delivery.attempt + 1);
        Ok(())
    }
}

// ============================================================================
// Processor
// ============================================================================

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        max_requeue_attempts: 3,
        republish_grace_secs: 60,
        stats_log_interval_secs: 3600,
    }
}

pub fn processor_with(
    ledger: Arc<InMemoryLedger>,
    classifier: Arc<dyn SentimentClassifier>,
    publisher: Arc<RecordingPublisher>,
    config: WorkerConfig,
) -> ReviewProcessor {
    ReviewProcessor::new(ledger, classifier, publisher, config, LoggingConfig::default())
}

pub fn processor(ledger: Arc<InMemoryLedger>, publisher: Arc<RecordingPublisher>) -> ReviewProcessor {
    processor_with(ledger, Arc::new(LexiconClassifier::new()), publisher, worker_config())
}
