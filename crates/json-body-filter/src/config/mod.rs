//! Configuration types for the JSON body filter.

mod listen;
mod rules;

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::matcher::{CompiledRules, ConfigurationError};
use crate::query::QueryDialect;

pub use listen::{ListenConfig, MetricsConfig, UpstreamConfig};
pub use rules::Rule;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Filter instance name, included in every log line and metric label
    #[serde(default = "default_name")]
    pub name: String,

    pub listen: ListenConfig,

    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Syntax of every rule's `bodyFieldPath`
    #[serde(default, rename = "queryDialect", alias = "query_dialect")]
    pub query_dialect: QueryDialect,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_name() -> String {
    "json-body-filter".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the hosting configuration.
    ///
    /// Rules are checked separately by [`Config::compile_rules`], which is the
    /// only place a filter can be built from.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.name.trim().is_empty() {
            anyhow::bail!("'name' must not be empty");
        }

        self.upstream.validate().map_err(|e| anyhow::anyhow!(e))?;
        self.listen_addr()?;

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "Metrics port {} collides with the listener port. Pick a different 'metrics.port'",
                self.metrics.port
            );
        }

        Ok(())
    }

    /// Socket address the proxy listens on.
    pub fn listen_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        socket_addr(&self.listen.host, self.listen.port)
    }

    /// Socket address of the metrics endpoint, bound to the proxy's host.
    ///
    /// `None` when metrics are disabled.
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>, anyhow::Error> {
        if !self.metrics.enabled {
            return Ok(None);
        }
        socket_addr(&self.listen.host, self.metrics.port).map(Some)
    }

    /// Compile the configured rules with the configured dialect.
    pub fn compile_rules(&self) -> Result<CompiledRules, ConfigurationError> {
        CompiledRules::compile(&self.rules, self.query_dialect)
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, anyhow::Error> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("'listen.host' must be an IP address, got '{host}'"))?;
    Ok(SocketAddr::new(ip, port))
}
