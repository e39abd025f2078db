//! JSON body parsing and rule matching.
//!
//! serde_json refuses documents nested deeper than 128 levels by default.
//! Bodies are accepted up to [`MAX_JSON_DEPTH`] levels instead. Deep documents
//! are parsed, matched and dropped on a dedicated stack, since all three
//! recurse once per nesting level.

use crate::matcher::{find_matching_rule, CompiledRule};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Deepest array/object nesting accepted in a request body.
pub const MAX_JSON_DEPTH: usize = 10_000;

/// Documents nested at most this deep are handled on the caller's stack.
const SHALLOW_JSON_DEPTH: usize = 64;

/// Stack reserved for one deeply nested document.
const DEEP_DOCUMENT_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Why a body could not be evaluated as JSON.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("nesting depth {0} exceeds {MAX_JSON_DEPTH}")]
    TooDeep(usize),

    #[error(transparent)]
    Syntax(#[from] serde_json::Error),
}

/// Parse `data` and return the first candidate whose value matches, with the matched value.
pub fn match_body<'a>(
    candidates: &[&'a CompiledRule],
    data: &[u8],
) -> Result<Option<(&'a CompiledRule, String)>, DocumentError> {
    let depth = nesting_depth(data);
    if depth > MAX_JSON_DEPTH {
        return Err(DocumentError::TooDeep(depth));
    }
    if depth <= SHALLOW_JSON_DEPTH {
        return parse_and_match(candidates, data);
    }

    debug!(depth, "matching deeply nested request body on a dedicated stack");
    stacker::grow(DEEP_DOCUMENT_STACK_BYTES, || parse_and_match(candidates, data))
}

// The document is dropped here, on whichever stack parsed it.
fn parse_and_match<'a>(
    candidates: &[&'a CompiledRule],
    data: &[u8],
) -> Result<Option<(&'a CompiledRule, String)>, DocumentError> {
    let mut deserializer = serde_json::Deserializer::from_slice(data);
    deserializer.disable_recursion_limit();
    let document = Value::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(find_matching_rule(candidates, &document))
}

/// Deepest array/object nesting in `data`, ignoring brackets inside strings.
///
/// Exact for valid JSON. For malformed input the figure only has to bound
/// what the parser reaches before it reports the error.
pub fn nesting_depth(data: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in data {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    deepest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rule;
    use crate::matcher::CompiledRules;
    use crate::query::QueryDialect;

    fn rules() -> CompiledRules {
        CompiledRules::compile(
            &[
                Rule::new("/api/test", "POST", "key", "^value$"),
                Rule::new("/api/test", "POST", "pad", r"^\[\[\[\]\]\]$"),
            ],
            QueryDialect::Dotted,
        )
        .unwrap()
    }

    fn nested_body(depth: usize) -> Vec<u8> {
        let mut body = br#"{"key":"value","pad":"#.to_vec();
        body.extend(std::iter::repeat(b'[').take(depth));
        body.extend(std::iter::repeat(b']').take(depth));
        body.push(b'}');
        body
    }

    #[test]
    fn test_nesting_depth() {
        assert_eq!(nesting_depth(b"42"), 0);
        assert_eq!(nesting_depth(br#"{"a":1}"#), 1);
        assert_eq!(nesting_depth(br#"{"a":[1,{"b":[]}],"c":{}}"#), 4);
        assert_eq!(nesting_depth(&nested_body(200)), 201);
    }

    #[test]
    fn test_nesting_depth_ignores_brackets_in_strings() {
        assert_eq!(nesting_depth(br#"{"a":"[[[{{{"}"#), 1);
        assert_eq!(nesting_depth(br#"{"a":"\"[[[","b":[1]}"#), 2);
        assert_eq!(nesting_depth(br#"["\\",[]]"#), 2);
    }

    #[test]
    fn test_shallow_body_matches() {
        let rules = rules();
        let candidates = rules.route_candidates("POST", "/api/test");
        let (rule, value) = match_body(&candidates, br#"{"key":"value"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(rule.index(), 0);
        assert_eq!(value, "value");
    }

    #[test]
    fn test_deeply_nested_body_still_matches() {
        let rules = rules();
        let candidates = rules.route_candidates("POST", "/api/test");

        for depth in [200, 1_000, MAX_JSON_DEPTH - 1] {
            let (rule, value) = match_body(&candidates, &nested_body(depth))
                .unwrap()
                .unwrap_or_else(|| panic!("no match at depth {depth}"));
            assert_eq!(rule.index(), 0);
            assert_eq!(value, "value");
        }
    }

    #[test]
    fn test_container_value_renders_as_compact_json() {
        let rules = rules();
        let candidates = rules.route_candidates("POST", "/api/test");
        let body = br#"{"key":"other","pad":[[[]]]}"#;
        let (rule, value) = match_body(&candidates, body).unwrap().unwrap();
        assert_eq!(rule.index(), 1);
        assert_eq!(value, "[[[]]]");
    }

    #[test]
    fn test_body_over_depth_limit_is_refused() {
        let rules = rules();
        let candidates = rules.route_candidates("POST", "/api/test");
        let err = match_body(&candidates, &nested_body(MAX_JSON_DEPTH)).unwrap_err();
        assert!(matches!(err, DocumentError::TooDeep(depth) if depth == MAX_JSON_DEPTH + 1));
    }

    #[test]
    fn test_malformed_body_is_a_syntax_error() {
        let rules = rules();
        let candidates = rules.route_candidates("POST", "/api/test");
        let bodies: [&[u8]; 3] = [b"", b"invalid json", br#"{"key":"value"} trailing"#];
        for body in bodies {
            assert!(matches!(
                match_body(&candidates, body),
                Err(DocumentError::Syntax(_))
            ));
        }
    }
}
