//! Prometheus metrics for the JSON body filter.
//!
//! Tracks filter decisions and proxied request outcomes.

use crate::filter::ForwardReason;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

lazy_static! {
    /// Filter decisions, by filter instance, outcome and forward reason
    pub static ref FILTER_DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "json_body_filter_decisions_total",
        "Total number of filter decisions",
        &["filter", "decision", "reason"]  // decision: forward|reject
    )
    .expect("decision counter can be registered");

    /// Total number of requests answered by the proxy
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "json_body_filter_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .expect("request counter can be registered");

    /// Upstream request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "json_body_filter_upstream_request_duration_ms",
        "Duration of forwarded upstream requests",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .expect("upstream histogram can be registered");
}

pub fn record_forward(filter: &str, reason: ForwardReason) {
    FILTER_DECISIONS_TOTAL
        .with_label_values(&[filter, "forward", reason.as_str()])
        .inc();
}

pub fn record_reject(filter: &str) {
    FILTER_DECISIONS_TOTAL
        .with_label_values(&[filter, "reject", "rule_match"])
        .inc();
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}

/// Collect all metrics in Prometheus text format.
pub fn collect_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn metrics_handler<B>(req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match collect_metrics() {
            Ok(body) => Response::builder()
                .header("content-type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::new()))
            }
        },
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new())),
    };
    // Builder input is static, so building cannot fail.
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Serve `GET /metrics` on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener) -> Result<(), anyhow::Error> {
    info!("Metrics listening on http://{}/metrics", listener.local_addr()?);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                debug!("Metrics connection error: {}", e);
            }
        });
    }
}

/// Bind `addr` and serve metrics on it.
pub async fn run(addr: SocketAddr) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener).await
}
