//! Listen, upstream, and metrics configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    pub port: u16,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

/// Where forwarded requests are sent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://127.0.0.1:3000`
    pub url: String,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), String> {
        let uri: hyper::Uri = self
            .url
            .parse()
            .map_err(|e| format!("Invalid upstream url '{}': {e}", self.url))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(format!(
                    "Unsupported upstream scheme '{other}' in '{}'. Currently supported: http",
                    self.url
                ))
            }
            None => return Err(format!("Upstream url '{}' has no scheme", self.url)),
        }
        if uri.authority().is_none() {
            return Err(format!("Upstream url '{}' has no host", self.url));
        }
        Ok(())
    }

    /// Base URL without a trailing slash, ready to be joined with a request path.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}
