//! OIDC discovery document fetching
//!
//! Resolves the token endpoint of an issuer once, at startup.

use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::metrics::send_instrumented;

pub const OAUTH_CLIENT_NAME: &str = "oauth";

/// OIDC Discovery document (partial)
#[derive(Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

/// Endpoints of a discovered provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub issuer: String,
    pub token_url: Url,
}

impl Provider {
    pub async fn discover(client: &Client, issuer: &str) -> Result<Self> {
        let doc = fetch_discovery(client, issuer).await?;

        let token_endpoint = doc
            .token_endpoint
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| Error::provider_init("discovery document has no token_endpoint"))?;
        let token_url = Url::parse(&token_endpoint).map_err(|e| {
            Error::provider_init(format!("invalid token_endpoint '{}': {}", token_endpoint, e))
        })?;

        info!("discovered token endpoint {} for issuer {}", token_url, doc.issuer);
        Ok(Self {
            issuer: doc.issuer,
            token_url,
        })
    }
}

/// Fetch the OIDC discovery document for an issuer
pub async fn fetch_discovery(client: &Client, issuer: &str) -> Result<DiscoveryDocument> {
    let discovery_url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));

    let request = client
        .get(&discovery_url)
        .header(http::header::ACCEPT, "application/json")
        .build()
        .map_err(|e| Error::provider_init(format!("invalid discovery URL '{}': {}", discovery_url, e)))?;

    let response = send_instrumented(client, OAUTH_CLIENT_NAME, request)
        .await
        .map_err(|e| Error::provider_init(format!("failed to fetch discovery document: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::provider_init(format!(
            "failed to fetch discovery document: {} {}",
            status,
            body.trim()
        )));
    }

    let doc: DiscoveryDocument = response
        .json()
        .await
        .map_err(|e| Error::provider_init(format!("invalid discovery document: {}", e)))?;

    if doc.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(Error::provider_init(format!(
            "issuer did not match the issuer returned by provider, expected '{}' got '{}'",
            issuer, doc.issuer
        )));
    }

    Ok(doc)
}
