/// Metrics and telemetry for Evalap
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts
/// - Login outcomes and lockouts
/// - Submission creation and status transitions
/// - Scope denials

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    // ========== Login Guard Metrics ==========

    /// Login attempts by outcome (success, unauthorized, blocked, rejected)
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "login_attempts_total",
        "Total number of login attempts",
        &["outcome"]
    )
    .unwrap();

    /// Retries against the shared attempt store
    pub static ref ATTEMPT_STORE_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_store_retries_total",
        "Total number of retried attempt store operations",
        &["operation"]
    )
    .unwrap();

    // ========== Submission Metrics ==========

    /// Submissions created by kind
    pub static ref SUBMISSIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_created_total",
        "Total number of submissions created",
        &["kind", "late"]
    )
    .unwrap();

    /// Status transitions by kind and new status
    pub static ref STATUS_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "status_transitions_total",
        "Total number of submission status transitions",
        &["kind", "status"]
    )
    .unwrap();

    /// Submissions deleted by kind
    pub static ref SUBMISSIONS_DELETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_deleted_total",
        "Total number of submissions deleted",
        &["kind"]
    )
    .unwrap();

    /// Submission code collisions by kind
    pub static ref CODE_COLLISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submission_code_collisions_total",
        "Total number of submission code collisions",
        &["kind"]
    )
    .unwrap();

    // ========== Scope Metrics ==========

    /// Out-of-scope access attempts by record type
    pub static ref SCOPE_DENIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scope_denials_total",
        "Total number of requests denied by scope",
        &["record_type"]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Account creations by role
    pub static ref ACCOUNT_CREATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_creations_total",
        "Total number of accounts created",
        &["role"]
    )
    .unwrap();

    /// Active sessions
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of sessions issued and not yet revoked by this process"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}

/// Record a login attempt outcome
pub fn record_login(outcome: &str) {
    LOGIN_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_store_retry(operation: &str) {
    ATTEMPT_STORE_RETRIES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record a created submission
pub fn record_submission_created(kind: &str, late: bool) {
    SUBMISSIONS_CREATED_TOTAL
        .with_label_values(&[kind, if late { "yes" } else { "no" }])
        .inc();
}

/// Record a status transition
pub fn record_transition(kind: &str, status: &str) {
    STATUS_TRANSITIONS_TOTAL
        .with_label_values(&[kind, status])
        .inc();
}

pub fn record_submission_deleted(kind: &str) {
    SUBMISSIONS_DELETED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_code_collision(kind: &str) {
    CODE_COLLISIONS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a request for a record outside the caller's scope
pub fn record_scope_denial(record_type: &str) {
    SCOPE_DENIALS_TOTAL.with_label_values(&[record_type]).inc();
}

/// Record an account creation
pub fn record_account_creation(role: &str) {
    ACCOUNT_CREATIONS_TOTAL.with_label_values(&[role]).inc();
}
