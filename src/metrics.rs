use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder, opts,
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
};

pub static REVIEW_MESSAGES_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "review_messages_received_total",
        "Total number of review deliveries taken off the inbound stream"
    ))
    .expect("Failed to register review_messages_received_total metric")
});

/// Final disposition per delivery, labelled with how processing resolved
pub static REVIEW_DISPOSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "review_dispositions_total",
            "Review deliveries by disposition and resolution"
        ),
        &["disposition", "resolution"]
    )
    .expect("Failed to register review_dispositions_total metric")
});

pub static REVIEW_PROCESSING_TIME: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "review_processing_seconds",
        "Time from receipt of a review delivery to its disposition",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register review_processing_seconds metric")
});

pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "review_events_published_total",
            "Processed-review events handed to the publisher backend"
        ),
        &["backend", "status"]
    )
    .expect("Failed to register review_events_published_total metric")
});

pub static PUBLISH_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "review_publish_latency_seconds",
        "Publish latency per backend in seconds",
        &["backend"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register review_publish_latency_seconds metric")
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
