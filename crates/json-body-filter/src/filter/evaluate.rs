//! The per-request decision procedure.

use super::body::{read_bounded, replay_with_remainder, BodyRead, MAX_INSPECTED_BODY_BYTES};
use super::content_type::is_json_content_type;
use super::document::match_body;
use crate::matcher::CompiledRules;

use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::Request;
use std::borrow::Cow;
use std::fmt::{self, Display};
use tracing::debug;

/// Why a request was forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardReason {
    /// Content type missing or not JSON; body never read
    ContentType,
    /// No rule for this path and method; body never read
    NoRule,
    /// Body at or above the inspection limit
    BodyTooLarge,
    /// Body stream failed mid-read
    BodyReadError,
    /// Body is not valid JSON (includes the empty body)
    InvalidJson,
    /// Body inspected, no rule matched
    NoMatch,
}

impl ForwardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardReason::ContentType => "content_type",
            ForwardReason::NoRule => "no_rule",
            ForwardReason::BodyTooLarge => "body_too_large",
            ForwardReason::BodyReadError => "body_read_error",
            ForwardReason::InvalidJson => "invalid_json",
            ForwardReason::NoMatch => "no_match",
        }
    }
}

impl Display for ForwardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a blocked request, used for the audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub rule_index: usize,
    pub method: String,
    pub path: String,
    pub field_path: String,
    pub value: String,
}

/// Final outcome for one request.
pub enum Decision<E> {
    /// Hand the request to the next handler. The body yields the original bytes.
    Forward {
        request: Request<BoxBody<Bytes, E>>,
        reason: ForwardReason,
    },
    /// Block the request; the next handler must not run.
    Reject(Rejection),
}

impl<E> Decision<E> {
    fn forward(request: Request<BoxBody<Bytes, E>>, reason: ForwardReason) -> Self {
        debug!(reason = %reason, "forwarding request");
        Decision::Forward { request, reason }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Decision::Reject(_))
    }
}

impl<E> fmt::Debug for Decision<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Forward { request, reason } => f
                .debug_struct("Forward")
                .field("method", request.method())
                .field("uri", request.uri())
                .field("reason", reason)
                .finish(),
            Decision::Reject(rejection) => f.debug_tuple("Reject").field(rejection).finish(),
        }
    }
}

/// Evaluate `request` against `rules`.
///
/// Any input the filter cannot confidently evaluate is forwarded. Only a
/// positive match on path, method and body value rejects.
pub async fn evaluate<B>(rules: &CompiledRules, request: Request<B>) -> Decision<B::Error>
where
    B: Body<Data = Bytes> + Send + Sync + Unpin + 'static,
    B::Error: Display + Send + Sync + 'static,
{
    if !is_json_content_type(request.headers()) {
        return Decision::forward(request.map(BodyExt::boxed), ForwardReason::ContentType);
    }

    let path = decode_path(request.uri().path()).into_owned();
    let candidates = rules.route_candidates(request.method().as_str(), &path);
    if candidates.is_empty() {
        return Decision::forward(request.map(BodyExt::boxed), ForwardReason::NoRule);
    }

    // A declared length over the limit can be skipped without touching the body.
    if request.body().size_hint().lower() >= MAX_INSPECTED_BODY_BYTES as u64 {
        return Decision::forward(request.map(BodyExt::boxed), ForwardReason::BodyTooLarge);
    }

    let (parts, body) = request.into_parts();
    let buffered = match read_bounded(body, MAX_INSPECTED_BODY_BYTES).await {
        BodyRead::Complete(buffered) => buffered,
        BodyRead::Capped { prefix, rest } => {
            let body = replay_with_remainder(prefix, rest);
            let request = Request::from_parts(parts, body);
            return Decision::forward(request, ForwardReason::BodyTooLarge);
        }
        BodyRead::Failed(partial) => {
            let body = partial.into_body();
            let request = Request::from_parts(parts, body);
            return Decision::forward(request, ForwardReason::BodyReadError);
        }
    };

    let matched = match match_body(&candidates, buffered.data()) {
        Ok(matched) => matched,
        Err(e) => {
            debug!(error = %e, "request body is not valid JSON");
            let body = buffered.into_body();
            let request = Request::from_parts(parts, body);
            return Decision::forward(request, ForwardReason::InvalidJson);
        }
    };

    match matched {
        Some((rule, value)) => Decision::Reject(Rejection {
            rule_index: rule.index(),
            method: parts.method.to_string(),
            path,
            field_path: rule.field_path().unwrap_or_default().to_string(),
            value,
        }),
        None => {
            let body = buffered.into_body();
            Decision::forward(Request::from_parts(parts, body), ForwardReason::NoMatch)
        }
    }
}

/// Percent-decode a request path so rules see the path the upstream routes on.
///
/// A path that does not decode to UTF-8 is used as received.
fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}
