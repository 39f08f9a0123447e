
use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref TXN_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("txn_completed_total", "Transactions completed, by outcome and abort reason"),
        &["outcome", "reason"]
    )
    .expect("metric can not be created");

    pub static ref FENCED_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fenced_requests_total", "Requests rejected by producer or member fencing"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref MARKER_FANOUT_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("marker_fanout_latency_ms", "Time to ack every marker leg of a completion")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets")),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref MARKER_LEG_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("marker_leg_failures_total", "Marker legs that exhausted their retries"),
        &["topic"]
    )
    .expect("metric can not be created");

    pub static ref SHARD_LOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("coordinator_shard_loads_total", "Coordinator shard replays after gaining leadership"),
        &["shard"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_LOGICAL_VERSION: IntGaugeVec = IntGaugeVec::new(
        Opts::new("active_logical_version", "Logical version records are currently written in"),
        &["node_id"]
    )
    .expect("metric can not be created");

    pub static ref RPC_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("coordinator_rpc_errors_total", "Coordinator responses carrying an error code"),
        &["api", "code"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TXN_COMPLETED_TOTAL.clone()),
        Box::new(FENCED_REQUESTS_TOTAL.clone()),
        Box::new(MARKER_FANOUT_LATENCY_MS.clone()),
        Box::new(MARKER_LEG_FAILURES_TOTAL.clone()),
        Box::new(SHARD_LOADS_TOTAL.clone()),
        Box::new(ACTIVE_LOGICAL_VERSION.clone()),
        Box::new(RPC_ERRORS_TOTAL.clone()),
    ];
    for c in collectors {
        if let Err(e) = registry.register(c) {
            warn!("collector can not be registered: {:?}", e);
        }
    }
}

/// Serves `/metrics` until `shutdown_signal` fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("metrics server listening on port {}", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics(&REGISTRY))
}

/// Renders custom metrics followed by the autometrics series
pub fn gather_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let mut res = String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    });

    res.push_str(&get_metrics_body());
    res
}

/// Export autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
