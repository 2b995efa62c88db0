use prometheus::{Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| async {
        info!("Initializing Metrics ...");
        Metrics::new()}
    ).await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Outbound client metrics (issuer discovery and token endpoint)
    pub client_requests: IntCounterVec,
    pub client_request_duration: HistogramVec,

    // Proxy handler metrics
    pub http_requests: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Refresh metrics
    pub token_refreshes: IntCounterVec,
    pub token_refresh_failures: IntCounterVec,
    pub token_expiry_unix: IntGaugeVec,

    // === Service resource metrics ===
    pub process_cpu_usage: Gauge,
    pub process_memory_usage: IntGauge,
    pub process_virtual_memory: IntGauge,
    pub process_open_fds: IntGauge,
    pub process_start_time: IntGauge,
    pub process_uptime: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Client
            client_requests: IntCounterVec::new(Opts::new("client_api_requests_total", "A counter for requests from the wrapped client."),&["code", "method", "client"],).unwrap(),
            client_request_duration: HistogramVec::new(HistogramOpts::new("request_duration_seconds", "A histogram of request latencies."),&["method", "client"],).unwrap(),

            // Proxy
            http_requests: IntCounterVec::new(Opts::new("http_requests_total", "Tracks the number of HTTP requests."),&["code", "method", "handler"],).unwrap(),
            http_request_duration: HistogramVec::new(HistogramOpts::new("http_request_duration_seconds", "Tracks the latencies for HTTP requests."),&["code", "method", "handler"],).unwrap(),

            // Refresh
            token_refreshes: IntCounterVec::new(Opts::new("token_refresh_total", "Successful token refreshes by mode"),&["mode"],).unwrap(),
            token_refresh_failures: IntCounterVec::new(Opts::new("token_refresh_failures_total", "Failed token refreshes by mode and reason"),&["mode", "reason"],).unwrap(),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_timestamp_seconds", "Expiry of the last published token"),&["mode"],).unwrap(),

            process_cpu_usage: Gauge::new("process_cpu_usage_percent", "CPU usage % of this process").unwrap(),
            process_memory_usage: IntGauge::new("process_resident_memory_bytes", "Resident memory used by this process").unwrap(),
            process_virtual_memory: IntGauge::new("process_virtual_memory_bytes", "Virtual memory used by this process").unwrap(),
            process_open_fds: IntGauge::new("process_open_fds", "Number of open file descriptors").unwrap(),
            process_start_time: IntGauge::new("process_start_time_seconds", "Process start time (UNIX seconds)").unwrap(),
            process_uptime: IntGauge::new("process_uptime_seconds", "Process uptime seconds").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.client_requests.clone())).unwrap();
        reg.register(Box::new(metrics.client_request_duration.clone())).unwrap();
        reg.register(Box::new(metrics.http_requests.clone())).unwrap();
        reg.register(Box::new(metrics.http_request_duration.clone())).unwrap();
        reg.register(Box::new(metrics.token_refreshes.clone())).unwrap();
        reg.register(Box::new(metrics.token_refresh_failures.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();

        reg.register(Box::new(metrics.process_cpu_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_memory_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_virtual_memory.clone())).unwrap();
        reg.register(Box::new(metrics.process_open_fds.clone())).unwrap();
        reg.register(Box::new(metrics.process_start_time.clone())).unwrap();
        reg.register(Box::new(metrics.process_uptime.clone())).unwrap();

        metrics
    }
}

/// Send a request through `client`, recording count and latency under `name`.
pub async fn send_instrumented(
    client: &reqwest::Client,
    name: &str,
    request: reqwest::Request,
) -> reqwest::Result<reqwest::Response> {
    let metrics = get_metrics().await;
    let method = request.method().to_string();
    let start = Instant::now();

    let result = client.execute(request).await;

    metrics
        .client_request_duration
        .with_label_values(&[method.as_str(), name])
        .observe(start.elapsed().as_secs_f64());
    // transport failures carry no status code and are not counted
    if let Ok(response) = &result {
        metrics
            .client_requests
            .with_label_values(&[response.status().as_str(), method.as_str(), name])
            .inc();
    }
    result
}
