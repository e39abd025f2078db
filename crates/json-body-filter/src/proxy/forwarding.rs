//! Request forwarding to the upstream server.
//!
//! [`UpstreamForwarder`] is the downstream handler the filter hands
//! forwarded requests to.

use crate::metrics;
use crate::response::{error_response, ResponseExt};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::Service;
use tracing::{debug, error};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<HttpConnector, BoxBody<Bytes, hyper::Error>>;

/// Create a shared HTTP/1.1 client with connection pooling.
pub fn create_http_client() -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(60)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(5)));

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build(http_connector)
}

/// Forwards requests to a single upstream base URL.
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: HttpClient,
    upstream_url: Arc<str>,
}

impl UpstreamForwarder {
    pub fn new(client: HttpClient, upstream_url: &str) -> Self {
        Self {
            client,
            upstream_url: Arc::from(upstream_url),
        }
    }
}

impl Service<Request<BoxBody<Bytes, hyper::Error>>> for UpstreamForwarder {
    type Response = Response<BoxBody<Bytes, hyper::Error>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<BoxBody<Bytes, hyper::Error>>) -> Self::Future {
        let client = self.client.clone();
        let upstream_url = Arc::clone(&self.upstream_url);
        Box::pin(async move { Ok(forward_request(&client, &upstream_url, req).await) })
    }
}

/// Forward a request to `upstream_url`, keeping method, path, query, headers and body.
pub async fn forward_request(
    client: &HttpClient,
    upstream_url: &str,
    req: Request<BoxBody<Bytes, hyper::Error>>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let start_time = Instant::now();
    let (mut parts, body) = req.into_parts();

    let upstream_path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let full_uri = format!("{upstream_url}{upstream_path}");
    parts.uri = match full_uri.parse() {
        Ok(uri) => uri,
        Err(e) => {
            error!("Invalid upstream URI '{}': {}", full_uri, e);
            return error_response(StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_boxed();
        }
    };
    parts.headers.remove(HOST);

    debug!("Forwarding to: {}", parts.uri);
    let method = parts.method.clone();

    match client.request(Request::from_parts(parts, body)).await {
        Ok(upstream_response) => {
            let status = upstream_response.status().as_u16();
            let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
            metrics::record_upstream_duration(method.as_str(), status, duration_ms);
            upstream_response.map(BodyExt::boxed)
        }
        Err(e) => {
            error!("Failed to forward request to upstream: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "Bad Gateway").into_boxed()
        }
    }
}
