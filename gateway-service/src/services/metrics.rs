//! Prometheus metrics for gateway-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec, TextEncoder,
};

/// Authorization decisions by outcome (success, denied, error).
pub static AUTHZ_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_authz_decisions_total",
        "Total number of authorization decisions",
        &["outcome"]
    )
    .expect("Failed to register authz_decisions_total")
});

/// Policy engine round-trip duration.
pub static POLICY_EVAL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gateway_policy_eval_duration_seconds",
        "Policy engine evaluation duration in seconds",
        &["result"], // allow, deny, error
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register policy_eval_duration")
});

/// Distribution of computed risk scores.
pub static RISK_SCORE_DISTRIBUTION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gateway_risk_score",
        "Distribution of computed risk scores",
        vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]
    )
    .expect("Failed to register risk_score")
});

/// Audit writes that failed; the request already completed, so these only
/// show up here and in the logs.
pub static AUDIT_WRITE_FAILURES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "gateway_audit_write_failures_total",
        "Total number of failed audit writes"
    )
    .expect("Failed to register audit_write_failures")
});

/// Login flow outcomes (initiated, completed, failed).
pub static LOGIN_FLOWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_login_flows_total",
        "Total number of login flow transitions",
        &["stage"]
    )
    .expect("Failed to register login_flows_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&AUTHZ_DECISIONS_TOTAL);
    Lazy::force(&POLICY_EVAL_DURATION);
    Lazy::force(&RISK_SCORE_DISTRIBUTION);
    Lazy::force(&AUDIT_WRITE_FAILURES);
    Lazy::force(&LOGIN_FLOWS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
