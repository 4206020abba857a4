use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Cache Metrics (Redis)
    pub static ref CACHE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_operations_total",
        "Total number of cache operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref CACHE_HIT_RATIO: CounterVec = register_counter_vec!(
        "cache_hit_ratio",
        "Cache hit/miss ratio",
        &["result"]
    )
    .unwrap();

    pub static ref CACHE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "cache_operation_duration_seconds",
        "Cache operation duration in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]
    )
    .unwrap();

    // Business Metrics
    pub static ref DAILY_PUZZLES_SERVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "daily_puzzles_served_total",
        "Daily puzzle fetches by result",
        &["result"]
    )
    .unwrap();

    pub static ref GAME_SESSIONS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "game_sessions_started_total",
        "Game sessions created, by owner kind",
        &["kind"]
    )
    .unwrap();

    pub static ref SUBMITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submits_total",
        "Board submits by resulting state",
        &["result"]
    )
    .unwrap();

    pub static ref COMPLETIONS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "completions_recorded_total",
        "Completions folded into user statistics",
        &["outcome"]
    )
    .unwrap();

    pub static ref OTP_CODES_ISSUED_TOTAL: IntCounter = register_int_counter!(
        "otp_codes_issued_total",
        "One-time login codes issued"
    )
    .unwrap();

    pub static ref OTP_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "otp_verifications_total",
        "One-time code verification attempts by result",
        &["result"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Helper: track cache operation with metrics
pub async fn track_cache_operation<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    CACHE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    CACHE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

/// Record cache hit
pub fn record_cache_hit() {
    CACHE_HIT_RATIO.with_label_values(&["hit"]).inc();
}

/// Record cache miss
pub fn record_cache_miss() {
    CACHE_HIT_RATIO.with_label_values(&["miss"]).inc();
}
