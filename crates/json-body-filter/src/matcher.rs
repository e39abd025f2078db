//! Rule compilation and matching.

use crate::config::Rule;
use crate::query::{render_value, FieldSelector, QueryDialect};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Invalid filter configuration. The filter is never built when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("at least one rule is required")]
    NoRules,

    #[error("rule {index}: invalid value pattern: {source}")]
    InvalidPattern {
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("rule {index}: invalid body field path '{path}': {message}")]
    InvalidFieldPath {
        index: usize,
        path: String,
        message: String,
    },
}

/// A rule ready for per-request evaluation.
pub struct CompiledRule {
    index: usize,
    matcher: Option<RuleMatcher>,
}

struct RuleMatcher {
    path: String,
    method: String,
    field_path: String,
    selector: Box<dyn FieldSelector>,
    pattern: Regex,
}

impl CompiledRule {
    pub fn compile(
        index: usize,
        rule: &Rule,
        dialect: QueryDialect,
    ) -> Result<Self, ConfigurationError> {
        if !rule.is_complete() {
            debug!(rule = index, "rule has empty fields, compiled as inert");
            return Ok(Self {
                index,
                matcher: None,
            });
        }

        let pattern = Regex::new(&rule.value_pattern)
            .map_err(|source| ConfigurationError::InvalidPattern { index, source })?;

        let selector = dialect.compile(&rule.body_field_path).map_err(|message| {
            ConfigurationError::InvalidFieldPath {
                index,
                path: rule.body_field_path.clone(),
                message,
            }
        })?;

        debug!(
            rule = index,
            path = %rule.path,
            method = %rule.method,
            field_path = %rule.body_field_path,
            dialect = dialect.as_str(),
            "compiled rule"
        );

        Ok(Self {
            index,
            matcher: Some(RuleMatcher {
                path: rule.path.clone(),
                method: rule.method.clone(),
                field_path: rule.body_field_path.clone(),
                selector,
                pattern,
            }),
        })
    }

    /// Position of the rule in the configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_inert(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn path(&self) -> Option<&str> {
        self.matcher.as_ref().map(|m| m.path.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        self.matcher.as_ref().map(|m| m.method.as_str())
    }

    pub fn field_path(&self) -> Option<&str> {
        self.matcher.as_ref().map(|m| m.field_path.as_str())
    }

    /// Exact, case-sensitive comparison of path and method. Inert rules never match.
    pub fn matches_route(&self, method: &str, path: &str) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|m| m.method == method && m.path == path)
    }

    /// Extract the configured field and test it against the value pattern.
    ///
    /// Returns the rendered value when it matches.
    pub fn match_document(&self, document: &Value) -> Option<String> {
        let matcher = self.matcher.as_ref()?;
        let node = matcher.selector.select(document)?;
        let value = render_value(node);
        matcher.pattern.is_match(&value).then_some(value)
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Some(m) => f
                .debug_struct("CompiledRule")
                .field("index", &self.index)
                .field("path", &m.path)
                .field("method", &m.method)
                .field("field_path", &m.field_path)
                .field("pattern", &m.pattern.as_str())
                .finish(),
            None => f
                .debug_struct("CompiledRule")
                .field("index", &self.index)
                .field("inert", &true)
                .finish(),
        }
    }
}

/// The full, ordered rule set of one filter instance.
///
/// Immutable once compiled; share it behind an `Arc`.
#[derive(Debug)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    pub fn compile(rules: &[Rule], dialect: QueryDialect) -> Result<Self, ConfigurationError> {
        if rules.is_empty() {
            return Err(ConfigurationError::NoRules);
        }

        let rules = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| CompiledRule::compile(index, rule, dialect))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules that can match a request.
    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| !r.is_inert()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Rules whose path and method match, in configuration order.
    pub fn route_candidates(&self, method: &str, path: &str) -> Vec<&CompiledRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches_route(method, path))
            .collect()
    }
}

/// First rule (in configuration order) whose value matches the document.
pub fn find_matching_rule<'a>(
    candidates: &[&'a CompiledRule],
    document: &Value,
) -> Option<(&'a CompiledRule, String)> {
    candidates
        .iter()
        .find_map(|rule| rule.match_document(document).map(|value| (*rule, value)))
}
