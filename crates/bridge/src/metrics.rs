use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static FORWARD_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static DIRECTIVES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("habridge_http_requests_total", "Bridge HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create habridge_http_requests_total"),
        )
    })
}

fn forward_duration_seconds() -> &'static HistogramVec {
    FORWARD_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "habridge_forward_duration_seconds",
                    "Downstream round-trip duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["outcome"],
            )
            .expect("create habridge_forward_duration_seconds"),
        )
    })
}

fn directives_total() -> &'static IntCounterVec {
    DIRECTIVES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "habridge_directives_total",
                    "Directives handled by outcome.",
                ),
                &["outcome"],
            )
            .expect("create habridge_directives_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();
}

pub fn observe_forward(outcome: &str, duration: Duration) {
    forward_duration_seconds()
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_directive(outcome: &str) {
    directives_total().with_label_values(&[outcome]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = http_requests_total();
    let _ = forward_duration_seconds();
    let _ = directives_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
