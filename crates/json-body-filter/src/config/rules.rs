//! Filter rule configuration.

use serde::{Deserialize, Serialize};

/// A declarative filter rule.
///
/// A rule with any empty field is inert: it compiles but never matches.
/// Leaving a field blank is the supported way to disable a rule without
/// deleting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Exact request path, e.g. `/api/test`
    #[serde(default)]
    pub path: String,
    /// Exact request method, e.g. `POST`
    #[serde(default)]
    pub method: String,
    /// Location of the inspected value inside the JSON body
    #[serde(default, alias = "bodyPath")]
    pub body_field_path: String,
    /// Regular expression tested against the extracted value (not anchored)
    #[serde(default, alias = "bodyValueCondition")]
    pub value_pattern: String,
}

impl Rule {
    pub fn new(path: &str, method: &str, body_field_path: &str, value_pattern: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            body_field_path: body_field_path.to_string(),
            value_pattern: value_pattern.to_string(),
        }
    }

    /// True when every field is set.
    pub fn is_complete(&self) -> bool {
        !(self.path.is_empty()
            || self.method.is_empty()
            || self.body_field_path.is_empty()
            || self.value_pattern.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_camel_case() {
        let yaml = r#"
path: /api/test
method: POST
bodyFieldPath: key
valuePattern: "^value$"
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule, Rule::new("/api/test", "POST", "key", "^value$"));
        assert!(rule.is_complete());
    }

    #[test]
    fn test_rule_accepts_plugin_field_names() {
        let yaml = r#"
path: /api/test
method: POST
bodyPath: user.name
bodyValueCondition: admin
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.body_field_path, "user.name");
        assert_eq!(rule.value_pattern, "admin");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let rule: Rule = serde_yaml::from_str("path: /api/test").unwrap();
        assert_eq!(rule.method, "");
        assert!(!rule.is_complete());
    }
}
