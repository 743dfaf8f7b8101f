// Prometheus metrics definitions for the legal battle backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Match sessions that have not expired.
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("legal_battle_active_sessions", "Live match sessions").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total matches started (persona created and opponent drawn).
    pub static ref MATCHES_STARTED_TOTAL: IntCounter = IntCounter::new(
        "legal_battle_matches_started_total",
        "Total matches started",
    )
    .unwrap();

    /// Total case outcomes computed, by outcome label.
    pub static ref CASES_SCORED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("legal_battle_cases_scored_total", "Total case outcomes computed"),
        &["outcome"],
    )
    .unwrap();

    /// Total score records persisted.
    pub static ref SCORES_SAVED_TOTAL: IntCounter = IntCounter::new(
        "legal_battle_scores_saved_total",
        "Score records persisted",
    )
    .unwrap();

    /// Total text-generation calls, by kind and ok/error.
    pub static ref LLM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("legal_battle_llm_requests_total", "Total LLM requests"),
        &["kind", "status"],
    )
    .unwrap();

    /// Strategy-option cache lookups, by hit/miss.
    pub static ref OPTIONS_CACHE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "legal_battle_options_cache_lookups_total",
            "Strategy option cache lookups",
        ),
        &["result"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("legal_battle_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Text-generation latency in seconds, by kind.
    pub static ref LLM_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "legal_battle_llm_request_duration_seconds",
            "LLM request duration in seconds",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["kind"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "legal_battle_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup;
/// repeated calls leave the registry unchanged.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(MATCHES_STARTED_TOTAL.clone()),
        Box::new(CASES_SCORED_TOTAL.clone()),
        Box::new(SCORES_SAVED_TOTAL.clone()),
        Box::new(LLM_REQUESTS_TOTAL.clone()),
        Box::new(OPTIONS_CACHE_LOOKUPS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(LLM_REQUEST_DURATION_SECONDS.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("Metric not registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace numeric and UUID path
/// segments with `:id` to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() || uuid::Uuid::parse_str(segment).is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
