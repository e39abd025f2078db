//! ProxyServer struct and main run loop.
//!
//! Every accepted connection is served on its own task. Requests pass
//! through the JSON body filter before reaching the upstream forwarder.

use super::forwarding::{create_http_client, HttpClient, UpstreamForwarder};
use crate::config::Config;
use crate::filter::JsonBodyFilterLayer;
use crate::matcher::CompiledRules;
use crate::metrics;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{error, info};

/// The filtering proxy server.
pub struct ProxyServer {
    config: Config,
    filter: JsonBodyFilterLayer,
    http_client: HttpClient,
}

impl ProxyServer {
    /// Create a server from configuration, compiling its rules.
    ///
    /// Any rule configuration error aborts construction.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let rules = config.compile_rules()?;
        let filter = JsonBodyFilterLayer::new(config.name.clone(), Arc::new(rules));

        Ok(Self {
            config,
            filter,
            http_client: create_http_client(),
        })
    }

    pub fn rules(&self) -> &CompiledRules {
        self.filter.rules()
    }

    /// Bind the configured listen address and serve.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.config.listen_addr()?).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` and handle requests until an accept error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Listening on http://{}", listener.local_addr()?);
        info!("Proxying to {}", self.config.upstream.base_url());
        info!(
            "Loaded {} rules ({} active) for filter '{}'",
            self.rules().len(),
            self.rules().active_count(),
            self.filter.name()
        );

        let service = ServiceBuilder::new()
            .layer(self.filter.clone())
            .service(UpstreamForwarder::new(
                self.http_client.clone(),
                self.config.upstream.base_url(),
            ));

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let service = service.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let connection_service = service_fn(move |req: Request<Incoming>| {
                    let service = service.clone();
                    async move {
                        let method = req.method().clone();
                        let response = service.oneshot(req).await?;
                        metrics::record_request(method.as_str(), response.status().as_u16());
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, connection_service)
                    .await
                {
                    error!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }
}
