//! Field-path queries into parsed JSON documents.
//!
//! A query resolves to zero or one node. Matching logic only ever sees the
//! [`FieldSelector`] trait, so the path dialect can change without touching
//! the rule engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;

/// Select at most one node from a parsed JSON document.
pub trait FieldSelector: Send + Sync {
    fn select<'a>(&self, document: &'a Value) -> Option<&'a Value>;
}

/// Syntax used for a rule's `bodyFieldPath`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryDialect {
    /// `key`, `user.name`, `items[0].id`, `items[*].id`
    #[default]
    Dotted,
    /// RFC 9535 JSONPath; the first node of the result is selected
    #[serde(alias = "jsonPath")]
    JsonPath,
}

impl QueryDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryDialect::Dotted => "dotted",
            QueryDialect::JsonPath => "jsonpath",
        }
    }

    /// Compile `path` into a selector for this dialect.
    ///
    /// Returns a human readable message when the path is not valid.
    pub fn compile(&self, path: &str) -> Result<Box<dyn FieldSelector>, String> {
        match self {
            QueryDialect::Dotted => Ok(Box::new(DottedPath::new(path))),
            QueryDialect::JsonPath => JsonPathSelector::parse(path)
                .map(|selector| Box::new(selector) as Box<dyn FieldSelector>),
        }
    }
}

/// Shallow field path: dot separated object keys with optional array indexing.
///
/// Supports:
/// - `field` / `$.field` - top-level field
/// - `field.nested` - nested field
/// - `array[0]` or `array.0` - array index
/// - `array[*].field` - first element for which the rest of the path resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath {
    path: String,
}

impl DottedPath {
    pub fn new(path: &str) -> Self {
        let path = path.strip_prefix("$.").unwrap_or(path);
        let path = path.strip_prefix('$').unwrap_or(path);
        Self {
            path: path.to_string(),
        }
    }
}

impl FieldSelector for DottedPath {
    fn select<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        navigate_json(document, &self.path)
    }
}

/// Navigate a JSON structure following a dotted path.
fn navigate_json<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    // Array index or wildcard
    if let Some(bracketed) = path.strip_prefix('[') {
        let end = bracketed.find(']')?;
        let index = &bracketed[..end];
        let rest = &bracketed[end + 1..];
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        let items = value.as_array()?;

        if index == "*" {
            return items.iter().find_map(|item| navigate_json(item, rest));
        }
        let item = items.get(index.parse::<usize>().ok()?)?;
        return navigate_json(item, rest);
    }

    // Split on the first . or [
    let split_at = path.find(['.', '[']).unwrap_or(path.len());
    let (segment, rest) = path.split_at(split_at);
    let rest = rest.strip_prefix('.').unwrap_or(rest);

    let next = match value {
        Value::Object(map) => map.get(segment)?,
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
        _ => return None,
    };
    navigate_json(next, rest)
}

/// RFC 9535 JSONPath selector.
#[derive(Debug)]
pub struct JsonPathSelector {
    path: JsonPath,
}

impl JsonPathSelector {
    pub fn parse(path: &str) -> Result<Self, String> {
        JsonPath::parse(path)
            .map(|path| Self { path })
            .map_err(|e| e.to_string())
    }
}

impl FieldSelector for JsonPathSelector {
    fn select<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.path.query(document).first()
    }
}

/// Render a JSON node to the text a value pattern is matched against.
///
/// Strings render without quotes; every other node renders as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dotted(document: &Value, path: &str) -> Option<String> {
        DottedPath::new(path).select(document).map(render_value)
    }

    #[test]
    fn test_dotted_simple_field() {
        let doc = json!({"name": "John", "age": 30});
        assert_eq!(dotted(&doc, "name"), Some("John".to_string()));
        assert_eq!(dotted(&doc, "$.name"), Some("John".to_string()));
        assert_eq!(dotted(&doc, "age"), Some("30".to_string()));
        assert_eq!(dotted(&doc, "missing"), None);
    }

    #[test]
    fn test_dotted_nested() {
        let doc = json!({"user": {"profile": {"name": "John"}}});
        assert_eq!(dotted(&doc, "user.profile.name"), Some("John".to_string()));
        assert_eq!(dotted(&doc, "user.name"), None);
    }

    #[test]
    fn test_dotted_array_index() {
        let doc = json!({"users": [{"name": "Alice"}, {"name": "Bob"}]});
        assert_eq!(dotted(&doc, "users[0].name"), Some("Alice".to_string()));
        assert_eq!(dotted(&doc, "users.1.name"), Some("Bob".to_string()));
        assert_eq!(dotted(&doc, "users[2].name"), None);
        assert_eq!(dotted(&doc, "users[x].name"), None);
    }

    #[test]
    fn test_dotted_wildcard_returns_first_resolving_element() {
        let doc = json!({"items": [{"other": 0}, {"id": 2}, {"id": 3}]});
        assert_eq!(dotted(&doc, "items[*].id"), Some("2".to_string()));
    }

    #[test]
    fn test_dotted_does_not_descend_into_scalars() {
        let doc = json!({"key": "value"});
        assert_eq!(dotted(&doc, "key.inner"), None);
        assert_eq!(dotted(&json!("top"), "key"), None);
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&json!("text")), "text");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!(1.5)), "1.5");
        assert_eq!(render_value(&json!(true)), "true");
        assert_eq!(render_value(&Value::Null), "null");
    }

    #[test]
    fn test_render_containers_as_compact_json() {
        assert_eq!(render_value(&json!([1, 2])), "[1,2]");
        assert_eq!(render_value(&json!({"a": "b"})), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_jsonpath_selects_first_node() {
        let selector = QueryDialect::JsonPath.compile("$.items[*].id").unwrap();
        let doc = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(selector.select(&doc), Some(&json!(1)));

        let missing = QueryDialect::JsonPath.compile("$.nope").unwrap();
        assert_eq!(missing.select(&doc), None);
    }

    #[test]
    fn test_jsonpath_rejects_invalid_syntax() {
        assert!(QueryDialect::JsonPath.compile("$[").is_err());
        assert!(QueryDialect::Dotted.compile("$[").is_ok());
    }

    #[test]
    fn test_dialect_deserializes_lowercase() {
        let dialect: QueryDialect = serde_yaml::from_str("jsonpath").unwrap();
        assert_eq!(dialect, QueryDialect::JsonPath);
        let dialect: QueryDialect = serde_yaml::from_str("dotted").unwrap();
        assert_eq!(dialect, QueryDialect::Dotted);
    }
}
