//! # Token Refresher Library
//!
//! Keeps an OAuth2 client-credentials token from an OIDC issuer continuously
//! valid, and exposes it either as a file on disk or as the `Authorization`
//! header of requests proxied to a fixed upstream.
//!
//! Modules:
//! - `config`: command line flags and validated settings
//! - `cache`: token value and the live token shared with the proxy
//! - `sources`: OIDC discovery and the token endpoint exchange
//! - `scheduler`: the refresh loop
//! - `sinks`: where fetched tokens are published
//! - `proxy`: path joining and the forwarding handler

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod scheduler;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::error::{Error, Result};
