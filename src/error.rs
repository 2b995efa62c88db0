//! Error taxonomy of the refresher.
//!
//! `Config` and `ProviderInit` are fatal and only produced during startup.
//! `Fetch`, `InvalidToken` and `Publish` are per-cycle errors: the refresh
//! scheduler logs them and tries again after the retry interval.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for refresher operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("OIDC provider initialization failed: {message}")]
    ProviderInit { message: String },

    #[error("failed to get token: {message}")]
    Fetch { message: String },

    #[error("token is invalid, exp: {}", format_expiry(.expiry))]
    InvalidToken { expiry: Option<DateTime<Utc>> },

    #[error("failed to write token to {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream setup failed: {message}")]
    Upstream { message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn provider_init(message: impl Into<String>) -> Self {
        Self::ProviderInit {
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Short label used for the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::ProviderInit { .. } => "provider",
            Error::Fetch { .. } => "fetch",
            Error::InvalidToken { .. } => "invalid",
            Error::Publish { .. } => "publish",
            Error::Upstream { .. } => "upstream",
        }
    }
}

fn format_expiry(expiry: &Option<DateTime<Utc>>) -> String {
    expiry
        .map(|exp| exp.to_rfc3339())
        .unwrap_or_else(|| "none".to_string())
}
