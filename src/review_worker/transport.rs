use anyhow::Result;
use async_trait::async_trait;

/// One inbound message as handed out by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport handle used to settle the delivery (stream entry id)
    pub delivery_id: String,
    /// Raw message body
    pub payload: Vec<u8>,
    /// 1-based delivery attempt; grows only on the requeue path
    pub attempt: u32,
}

impl Delivery {
    pub fn new(delivery_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            payload: payload.into(),
            attempt: 1,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }
}

/// Broker primitives the dispatch loop maps dispositions onto.
///
/// A transport hands out at most one delivery at a time; the caller settles
/// it with exactly one of `ack`, `reject` or `requeue` before fetching again.
#[async_trait]
pub trait DeliveryTransport: Send {
    /// Create the inbound and dead-letter destinations if missing.
    async fn declare_topology(&mut self) -> Result<()>;

    /// Next delivery, or `None` when nothing arrived within the poll window.
    async fn fetch(&mut self) -> Result<Option<Delivery>>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Settle without redelivery, moving the body to the dead-letter destination.
    async fn reject(&mut self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Settle and make the body available again with `attempt + 1`.
    async fn requeue(&mut self, delivery: &Delivery) -> Result<()>;
}
