use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::header::{AUTHORIZATION, CONNECTION, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client};
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::token_cache::TokenCache;
use crate::config::settings::UpstreamConfig;
use crate::error::{Error, Result};
use crate::observability::metrics::get_metrics;
use crate::proxy::path::{join_url_path, UrlPath};

pub const PREFIX_HEADER: &str = "x-forwarded-prefix";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
static PROXY_MSG: &str = "proxy";

/// Headers that only apply to a single connection and are never forwarded.
const HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Where proxied requests go. Derived once from the upstream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub scheme: String,
    /// Host plus optional port, as used in the request target and `Host`.
    pub authority: String,
    pub base_path: UrlPath,
}

impl Upstream {
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::config(format!("upstream URL '{}' has no host", url)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_owned(),
        };
        Ok(Self {
            scheme: url.scheme().to_owned(),
            authority,
            base_path: UrlPath::from_escaped(url.path()),
        })
    }

    /// Absolute upstream URL for an incoming request target. The query
    /// string is kept as is.
    pub fn target(&self, incoming: &Uri) -> String {
        let joined = join_url_path(&self.base_path, &UrlPath::from_escaped(incoming.path()));
        match incoming.query() {
            Some(query) => format!("{}://{}{}?{}", self.scheme, self.authority, joined.escaped(), query),
            None => format!("{}://{}{}", self.scheme, self.authority, joined.escaped()),
        }
    }
}

/// HTTP client for upstream calls: no redirect following, and the CA bundle
/// from `ca_file` replaces the built-in roots when given.
pub fn build_upstream_client(cfg: &UpstreamConfig) -> Result<Client> {
    let mut builder = Client::builder().redirect(Policy::none());

    if let Some(ca_file) = &cfg.ca_file {
        let pem = std::fs::read(ca_file).map_err(|e| {
            Error::upstream(format!(
                "failed to initialize upstream server TLS CA {}: {}",
                ca_file.display(),
                e
            ))
        })?;
        let certs = Certificate::from_pem_bundle(&pem)
            .map_err(|e| Error::upstream(format!("invalid upstream CA bundle: {}", e)))?;
        if certs.is_empty() {
            return Err(Error::upstream(format!(
                "no certificates found in upstream CA file {}",
                ca_file.display()
            )));
        }
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| Error::upstream(format!("cannot build upstream client: {}", e)))
}

#[derive(Clone)]
pub struct ProxyState {
    upstream: Arc<Upstream>,
    client: Client,
    tokens: TokenCache,
}

impl ProxyState {
    pub fn new(upstream: Upstream, client: Client, tokens: TokenCache) -> Self {
        Self {
            upstream: Arc::new(upstream),
            client,
            tokens,
        }
    }

    pub fn router(self) -> Router {
        Router::new().fallback(forward).with_state(self)
    }

    async fn forward_request(&self, req: Request) -> Response {
        let client_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let (parts, body) = req.into_parts();
        let target = self.upstream.target(&parts.uri);

        let mut headers = parts.headers;
        remove_hop_headers(&mut headers);
        headers.remove(HOST);
        headers.remove(AUTHORIZATION);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, &ip.to_string());
        }
        // Clients reach the upstream base path through `/`.
        headers.append(PREFIX_HEADER, HeaderValue::from_static("/"));

        match self.tokens.get() {
            Some(token) => match HeaderValue::from_str(&token.authorization()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!("token cannot be used as a header value: {}", err),
            },
            None => debug!("no valid token available, forwarding without Authorization"),
        }

        let mut request = self
            .client
            .request(parts.method, &target)
            .headers(headers);
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match request.send().await {
            Ok(upstream) => {
                let status = upstream.status();
                let mut headers = upstream.headers().clone();
                remove_hop_headers(&mut headers);

                let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(err) => {
                error!("http: proxy error: {}", err);
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

/// Reverse-proxy handler for every path and method.
async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    state.forward_request(req).await
}

/// Records `http_requests_total` and `http_request_duration_seconds` for the
/// proxy. Installed outside the timeout layers so their responses are counted.
pub async fn proxy_metrics_middleware(req: Request, next: Next) -> Response {
    let metrics = get_metrics().await;
    let start = Instant::now();
    let method = req.method().to_string();

    let response = next.run(req).await;

    let code = response.status();
    metrics
        .http_requests
        .with_label_values(&[code.as_str(), method.as_str(), PROXY_MSG])
        .inc();
    metrics
        .http_request_duration
        .with_label_values(&[code.as_str(), method.as_str(), PROXY_MSG])
        .observe(start.elapsed().as_secs_f64());
    response
}

fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let prior: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let value = if prior.is_empty() {
        client_ip.to_owned()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(FORWARDED_FOR_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_target_joins_base_path() {
        let url = Url::parse("https://observatorium.example:8443/api/metrics/v1/test").unwrap();
        let upstream = Upstream::from_url(&url).unwrap();
        assert_eq!(upstream.scheme, "https");
        assert_eq!(upstream.authority, "observatorium.example:8443");

        let uri: Uri = "/foo/bar?match=up".parse().unwrap();
        assert_eq!(
            upstream.target(&uri),
            "https://observatorium.example:8443/api/metrics/v1/test/foo/bar?match=up"
        );
    }

    #[test]
    fn upstream_without_path_forwards_request_path() {
        let upstream = Upstream::from_url(&Url::parse("http://localhost").unwrap()).unwrap();
        let uri: Uri = "/api/v1/query".parse().unwrap();
        assert_eq!(upstream.target(&uri), "http://localhost/api/v1/query");
    }

    fn upstream_config_with_ca(ca_file: std::path::PathBuf) -> UpstreamConfig {
        UpstreamConfig {
            url: Url::parse("https://observatorium.example").unwrap(),
            ca_file: Some(ca_file),
            read_timeout: None,
            write_timeout: None,
        }
    }

    #[test]
    fn missing_ca_file_is_an_upstream_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = upstream_config_with_ca(dir.path().join("missing-ca.pem"));
        let err = build_upstream_client(&cfg).unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }), "got {:?}", err);
        assert!(err.to_string().contains("missing-ca.pem"));
    }

    #[test]
    fn ca_file_without_certificates_is_an_upstream_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        let err = build_upstream_client(&upstream_config_with_ca(path)).unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }), "got {:?}", err);
    }

    #[test]
    fn hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("x-kept", HeaderValue::from_static("1"));
        remove_hop_headers(&mut headers);
        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-private").is_none());
        assert!(headers.get("x-kept").is_some());
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers.get(FORWARDED_FOR_HEADER).unwrap(), "10.0.0.1");
        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers.get(FORWARDED_FOR_HEADER).unwrap(), "10.0.0.1, 10.0.0.2");
    }
}
