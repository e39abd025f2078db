//! Proxy server module.
//!
//! Hosts the JSON body filter in front of a single upstream.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and main run loop
//! - `forwarding` - HTTP client and request forwarding to the upstream

mod forwarding;
mod server;

pub use forwarding::{create_http_client, forward_request, HttpClient, UpstreamForwarder};
pub use server::ProxyServer;
