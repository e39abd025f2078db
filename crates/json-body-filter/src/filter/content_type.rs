//! Content-type gate.

use hyper::header::CONTENT_TYPE;
use hyper::HeaderMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `application/json` or `application/<anything>+json`, optionally followed by parameters.
    static ref JSON_MEDIA_TYPE: Regex =
        Regex::new(r"(?i)^\s*application/([^;\s]+\+)?json\s*(;|$)")
            .expect("JSON media type pattern is valid");
}

/// True when the request declares a JSON (or `+json` suffixed) body.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| JSON_MEDIA_TYPE.is_match(value))
}
