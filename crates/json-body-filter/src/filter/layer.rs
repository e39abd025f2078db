//! Tower middleware wrapping the decision procedure.

use super::evaluate::{evaluate, Decision};
use crate::config::Rule;
use crate::matcher::{CompiledRules, ConfigurationError};
use crate::metrics;
use crate::query::QueryDialect;
use crate::response::{forbidden, ResponseExt};

use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

/// Layer that puts a [`JsonBodyFilter`] in front of a service.
#[derive(Clone)]
pub struct JsonBodyFilterLayer {
    name: Arc<str>,
    rules: Arc<CompiledRules>,
}

impl JsonBodyFilterLayer {
    /// Create a layer from an already compiled rule set.
    pub fn new(name: impl Into<String>, rules: Arc<CompiledRules>) -> Self {
        Self {
            name: Arc::from(name.into()),
            rules,
        }
    }

    /// Compile `rules` and create a layer. Fails on any configuration error.
    pub fn from_rules(
        name: impl Into<String>,
        rules: &[Rule],
        dialect: QueryDialect,
    ) -> Result<Self, ConfigurationError> {
        let compiled = CompiledRules::compile(rules, dialect)?;
        Ok(Self::new(name, Arc::new(compiled)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }
}

impl<S> Layer<S> for JsonBodyFilterLayer {
    type Service = JsonBodyFilter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JsonBodyFilter {
            inner,
            name: Arc::clone(&self.name),
            rules: Arc::clone(&self.rules),
        }
    }
}

/// Middleware that rejects requests whose JSON body matches a rule.
///
/// Forwarded requests reach `inner` with a replacement body that yields the
/// original bytes. Rejected requests get a 403 and `inner` is not called.
#[derive(Clone)]
pub struct JsonBodyFilter<S> {
    inner: S,
    name: Arc<str>,
    rules: Arc<CompiledRules>,
}

impl<S> JsonBodyFilter<S> {
    pub fn new(inner: S, name: impl Into<String>, rules: Arc<CompiledRules>) -> Self {
        Self {
            inner,
            name: Arc::from(name.into()),
            rules,
        }
    }
}

impl<S, B, E> Service<Request<B>> for JsonBodyFilter<S>
where
    S: Service<Request<BoxBody<Bytes, B::Error>>, Response = Response<BoxBody<Bytes, E>>>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Body<Data = Bytes> + Send + Sync + Unpin + 'static,
    B::Error: Display + Send + Sync + 'static,
    E: 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        // Keep the service that was driven to readiness, leave the clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let name = Arc::clone(&self.name);
        let rules = Arc::clone(&self.rules);

        Box::pin(async move {
            match evaluate(&rules, request).await {
                Decision::Forward { request, reason } => {
                    metrics::record_forward(&name, reason);
                    inner.call(request).await
                }
                Decision::Reject(rejection) => {
                    warn!(
                        filter = %name,
                        rule = rejection.rule_index,
                        method = %rejection.method,
                        path = %rejection.path,
                        field_path = %rejection.field_path,
                        value = %rejection.value,
                        "request blocked by JSON body rule"
                    );
                    metrics::record_reject(&name);
                    Ok(forbidden().into_boxed())
                }
            }
        })
    }
}
