//! HTTP middleware that rejects requests whose JSON body matches configured rules.
//!
//! A rule names an exact path and method, a field inside the JSON body, and a
//! regular expression. A request is blocked with `403 Forbidden` when the
//! extracted field value matches; anything the filter cannot confidently
//! evaluate is forwarded untouched.
//!
//! The filter is a [`tower::Layer`], see [`filter::JsonBodyFilterLayer`].
//! [`proxy::ProxyServer`] hosts it in front of an upstream HTTP server.

pub mod config;
pub mod filter;
pub mod matcher;
pub mod metrics;
pub mod proxy;
pub mod query;
pub mod response;
