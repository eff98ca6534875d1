//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the chat pipeline
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all Wayfarer metrics
pub const METRICS_PREFIX: &str = "wayfarer";

/// Histogram buckets for pipeline stage latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Chat requests by response mode and terminal phase"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat request latency from receipt to terminal phase"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Structured match plus semantic retrieval latency"
    );

    describe_counter!(
        format!("{}_city_matches_total", METRICS_PREFIX),
        Unit::Count,
        "Structured city lookups by outcome"
    );

    describe_counter!(
        format!("{}_snippets_retrieved_total", METRICS_PREFIX),
        Unit::Count,
        "Snippets returned by the vector store"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_model_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Generative model calls by mode and status"
    );

    describe_histogram!(
        format!("{}_model_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time until the model answer (buffered) or stream (streaming) is available"
    );

    describe_counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        Unit::Count,
        "Server-sent events emitted by kind"
    );

    tracing::info!("Metrics registered");
}

/// Record a chat request reaching a terminal phase
pub fn record_chat(mode: &str, phase: &str, duration_secs: f64) {
    counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        "mode" => mode.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// Record the retrieval stage of a request
pub fn record_retrieval(duration_secs: f64, city_matched: bool, snippet_count: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    let outcome = if city_matched { "hit" } else { "miss" };
    counter!(
        format!("{}_city_matches_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    counter!(format!("{}_snippets_retrieved_total", METRICS_PREFIX))
        .increment(snippet_count as u64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record model call metrics
pub fn record_model_call(duration_secs: f64, model: &str, mode: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_calls_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "mode" => mode.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_model_call_duration_seconds", METRICS_PREFIX),
            "mode" => mode.to_string()
        )
        .record(duration_secs);
    }
}

/// Count one emitted stream event
pub fn record_stream_event(kind: &'static str) {
    counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}
