// ============================================================================
// Dispatch Loop
// ============================================================================
//
// Pull loop with credit 1: fetch one delivery, run it through the processor,
// settle it on the transport, repeat until the shutdown flag is set.
//
// ============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::disposition::Disposition;
use super::processor::{ProcessOutcome, ReviewProcessor};
use super::transport::{Delivery, DeliveryTransport};

const IDLE_BACKOFF: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Running totals kept by the dispatch loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
    pub transport_errors: u64,
}

impl DispatchStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::RejectNoRequeue => self.rejected += 1,
            Disposition::NackRequeue => self.requeued += 1,
        }
    }
}

/// Map a disposition onto the transport's primitives.
pub async fn apply_disposition<T>(
    transport: &mut T,
    delivery: &Delivery,
    outcome: &ProcessOutcome,
) -> Result<()>
where
    T: DeliveryTransport + ?Sized,
{
    match outcome.disposition {
        Disposition::Ack => transport.ack(delivery).await,
        Disposition::RejectNoRequeue => {
            let reason = outcome
                .reason
                .as_deref()
                .unwrap_or_else(|| outcome.resolution.as_str());
            transport.reject(delivery, reason).await
        }
        Disposition::NackRequeue => transport.requeue(delivery).await,
    }
}

/// Fetch, process and settle a single delivery.
///
/// Returns `Ok(None)` when the transport had nothing to hand out.
pub async fn dispatch_one<T>(
    processor: &ReviewProcessor,
    transport: &mut T,
) -> Result<Option<ProcessOutcome>>
where
    T: DeliveryTransport + ?Sized,
{
    let Some(delivery) = transport.fetch().await.context("Failed to fetch delivery")? else {
        return Ok(None);
    };

    let outcome = processor.process(&delivery).await;

    apply_disposition(transport, &delivery, &outcome)
        .await
        .with_context(|| {
            format!(
                "Failed to apply {} to delivery {}",
                outcome.disposition, delivery.delivery_id
            )
        })?;

    debug!(
        delivery_id = %delivery.delivery_id,
        disposition = %outcome.disposition,
        "Delivery settled"
    );
    Ok(Some(outcome))
}

/// Run until `shutdown` is set. The delivery in flight when the flag flips is
/// always settled before the loop exits.
pub async fn run_dispatch_loop<T>(
    processor: &ReviewProcessor,
    transport: &mut T,
    shutdown: Arc<AtomicBool>,
    stats_interval: Duration,
) -> DispatchStats
where
    T: DeliveryTransport + ?Sized,
{
    let mut totals = DispatchStats::default();
    let mut window = DispatchStats::default();
    let mut last_stats_log = Instant::now();

    info!("Review dispatch loop started");

    while !shutdown.load(Ordering::SeqCst) {
        match dispatch_one(processor, transport).await {
            Ok(Some(outcome)) => {
                totals.record(outcome.disposition);
                window.record(outcome.disposition);
            }
            Ok(None) => {
                tokio::time::sleep(IDLE_BACKOFF).await;
            }
            Err(e) => {
                totals.transport_errors += 1;
                window.transport_errors += 1;
                error!(error = %format!("{:#}", e), "Review transport error");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }

        if last_stats_log.elapsed() >= stats_interval {
            info!(
                acked = window.acked,
                rejected = window.rejected,
                requeued = window.requeued,
                transport_errors = window.transport_errors,
                interval_secs = stats_interval.as_secs(),
                "Review worker throughput"
            );
            window = DispatchStats::default();
            last_stats_log = Instant::now();
        }
    }

    info!(
        acked = totals.acked,
        rejected = totals.rejected,
        requeued = totals.requeued,
        transport_errors = totals.transport_errors,
        "Review dispatch loop stopped"
    );
    totals
}
