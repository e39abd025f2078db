//! Response helpers shared by the filter and the proxy.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::convert::Infallible;

/// Body of the rejection response.
pub const FORBIDDEN_BODY: &str = "Forbidden";

/// Extension trait for `Response<Full<Bytes>>` providing common transformations.
pub trait ResponseExt {
    /// Convert the response body into a boxed body with any error type.
    ///
    /// `Full` never fails, so the error type is picked by the caller.
    fn into_boxed<E: 'static>(self) -> Response<BoxBody<Bytes, E>>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed<E: 'static>(self) -> Response<BoxBody<Bytes, E>> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Fixed 403 response returned when a rule blocks a request.
pub fn forbidden() -> Response<Full<Bytes>> {
    text_response(
        StatusCode::FORBIDDEN,
        "text/plain; charset=utf-8",
        FORBIDDEN_BODY.to_string(),
    )
}

/// JSON error response, e.g. when the upstream cannot be reached.
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    text_response(status, "application/json", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = forbidden().into_boxed::<Infallible>();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, FORBIDDEN_BODY);
    }

    #[tokio::test]
    async fn test_error_response_escapes_message() {
        let response = error_response(StatusCode::BAD_GATEWAY, r#"bad "gateway""#);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], r#"bad "gateway""#);
    }

    #[test]
    fn test_into_boxed_preserves_headers() {
        let response = Response::builder()
            .header("X-Custom", "value")
            .body(Full::new(Bytes::from("test")))
            .unwrap();

        let boxed = response.into_boxed::<hyper::Error>();
        assert_eq!(
            boxed.headers().get("X-Custom").map(|v| v.to_str().unwrap()),
            Some("value")
        );
    }
}
