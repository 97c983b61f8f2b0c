// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Optimization runs --------
pub static OPTIMIZATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("optimizations_total", "completed optimizations by solver path"),
        &["path"],
    )
    .unwrap()
});

pub static FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("solver_fallbacks_total", "exhaustive fallbacks by reason"),
        &["reason"],
    )
    .unwrap()
});

pub static SOLVER_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("solver_polls_total", "job status polls by outcome"),
        &["outcome"],
    )
    .unwrap()
});

pub static VALIDATION_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("validation_failures_total", "requests rejected by input validation").unwrap()
});

// -------- Model size --------
pub static HUBO_VARIABLES: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("hubo_variables", "binary variables in the last model").unwrap());

pub static HUBO_TERMS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("hubo_terms", "polynomial terms in the last model").unwrap());

// End-to-end latency of one optimization (milliseconds)
pub static LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("optimization_latency_ms", "Latency of one optimization (ms)")
            .buckets(vec![1.0, 5.0, 25.0, 100.0, 1_000.0, 10_000.0, 60_000.0, 300_000.0]),
    )
    .unwrap()
});

pub static LAST_NET_APR_BPS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("last_net_apr_bps", "net APR of the last decision (basis points)").unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; repeat calls are no-ops
    for m in [
        REGISTRY.register(Box::new(OPTIMIZATIONS.clone())),
        REGISTRY.register(Box::new(FALLBACKS.clone())),
        REGISTRY.register(Box::new(SOLVER_POLLS.clone())),
        REGISTRY.register(Box::new(VALIDATION_FAILURES.clone())),
        REGISTRY.register(Box::new(HUBO_VARIABLES.clone())),
        REGISTRY.register(Box::new(HUBO_TERMS.clone())),
        REGISTRY.register(Box::new(LATENCY_MS.clone())),
        REGISTRY.register(Box::new(LAST_NET_APR_BPS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
