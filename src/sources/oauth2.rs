use std::fmt;

use chrono::{DateTime, Duration, Utc};
use http::header::{ACCEPT, CONTENT_TYPE};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::cache::token::Token;
use crate::config::settings::OidcConfig;
use crate::error::{Error, Result};
use crate::observability::metrics::send_instrumented;
use crate::sources::discovery::{Provider, OAUTH_CLIENT_NAME};
use crate::sources::FetchToken;

/// Characters left alone when escaping client credentials for Basic auth.
const CREDENTIALS: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Extra parameters attached to the token request. Chosen once from the
/// configuration: username+password wins over scopes, scopes over audience.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    ClientCredentials,
    Password { username: String, password: String },
    Scope(String),
    Audience(String),
}

impl Grant {
    pub fn select(oidc: &OidcConfig, scopes: &[String]) -> Self {
        if let (Some(username), Some(password)) = (&oidc.username, &oidc.password) {
            return Grant::Password {
                username: username.clone(),
                password: password.clone(),
            };
        }
        if !scopes.is_empty() {
            return Grant::Scope(scopes.join(" "));
        }
        match &oidc.audience {
            Some(audience) => Grant::Audience(audience.clone()),
            None => Grant::ClientCredentials,
        }
    }

    /// Form body of the token request.
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            Grant::ClientCredentials => vec![("grant_type", "client_credentials")],
            Grant::Password { username, password } => vec![
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
            Grant::Scope(scope) => vec![("grant_type", "client_credentials"), ("scope", scope.as_str())],
            Grant::Audience(audience) => vec![
                ("grant_type", "client_credentials"),
                ("audience", audience.as_str()),
            ],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Grant::ClientCredentials => "client_credentials",
            Grant::Password { .. } => "password",
            Grant::Scope(_) => "scope",
            Grant::Audience(_) => "audience",
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Grant::Scope(scope) => f.debug_tuple("Scope").field(scope).finish(),
            Grant::Audience(audience) => f.debug_tuple("Audience").field(audience).finish(),
            Grant::ClientCredentials => f.write_str("ClientCredentials"),
        }
    }
}

/// Client-credentials token source bound to one issuer.
#[derive(Clone)]
pub struct OAuth2Source {
    client: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    grant: Grant,
}

impl OAuth2Source {
    pub fn new(client: Client, token_url: Url, oidc: &OidcConfig, scopes: &[String]) -> Self {
        Self {
            client,
            token_url,
            client_id: oidc.client_id.clone(),
            client_secret: oidc.client_secret.clone(),
            grant: Grant::select(oidc, scopes),
        }
    }

    /// Run OIDC discovery for the configured issuer and bind the source to
    /// its token endpoint. Failure here is fatal for the daemon.
    pub async fn discover(client: Client, oidc: &OidcConfig, scopes: &[String]) -> Result<Self> {
        let provider = Provider::discover(&client, &oidc.issuer_url).await?;
        Ok(Self::new(client, provider.token_url, oidc, scopes))
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn grant(&self) -> &Grant {
        &self.grant
    }
}

impl fmt::Debug for OAuth2Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Source")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("grant", &self.grant)
            .finish()
    }
}

impl FetchToken for OAuth2Source {
    async fn fetch_token(&self) -> Result<Token> {
        let request = self
            .client
            .post(self.token_url.clone())
            .basic_auth(
                utf8_percent_encode(&self.client_id, CREDENTIALS).to_string(),
                Some(utf8_percent_encode(&self.client_secret, CREDENTIALS).to_string()),
            )
            .header(ACCEPT, "application/json")
            .form(&self.grant.form())
            .build()
            .map_err(|e| Error::fetch(format!("cannot build token request: {}", e)))?;

        debug!("requesting token from {} (grant: {})", self.token_url, self.grant.kind());
        let response = send_instrumented(&self.client, OAUTH_CLIENT_NAME, request)
            .await
            .map_err(|e| Error::fetch(format!("token request failed: {}", e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(format!("cannot read token response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::fetch(describe_error_response(status, &body)));
        }

        let token = parse_token_response(&content_type, &body, Utc::now())?;
        if !token.valid() {
            return Err(Error::InvalidToken {
                expiry: token.expiry,
            });
        }
        Ok(token)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<NumberOrString>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Turn a token endpoint response body into a `Token`.
///
/// JSON is the norm; some issuers answer form-encoded. A missing or
/// non-positive `expires_in` yields a token without expiry.
pub fn parse_token_response(content_type: &str, body: &[u8], now: DateTime<Utc>) -> Result<Token> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();

    let (access_token, token_type, expires_in) = match mime {
        "application/x-www-form-urlencoded" | "text/plain" => {
            let mut access_token = String::new();
            let mut token_type = None;
            let mut expires_in = None;
            for (key, value) in url::form_urlencoded::parse(body) {
                match key.as_ref() {
                    "access_token" => access_token = value.into_owned(),
                    "token_type" => token_type = Some(value.into_owned()),
                    "expires_in" => expires_in = Some(NumberOrString::Text(value.into_owned())),
                    _ => {}
                }
            }
            (access_token, token_type, expires_in)
        }
        _ => {
            let parsed: TokenResponse = serde_json::from_slice(body)
                .map_err(|e| Error::fetch(format!("cannot parse token response: {}", e)))?;
            (parsed.access_token, parsed.token_type, parsed.expires_in)
        }
    };

    let expires_in = match expires_in {
        None => None,
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Text(text)) if text.trim().is_empty() => None,
        Some(NumberOrString::Text(text)) => Some(
            text.trim()
                .parse::<i64>()
                .map_err(|_| Error::fetch(format!("invalid expires_in '{}'", text)))?,
        ),
    };

    let expiry = match expires_in.filter(|secs| *secs > 0) {
        None => None,
        Some(secs) => Some(
            Duration::try_seconds(secs)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or_else(|| Error::fetch(format!("expires_in {} out of range", secs)))?,
        ),
    };

    Ok(Token {
        access_token,
        token_type: token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string()),
        expiry,
    })
}

fn describe_error_response(status: http::StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => match err.error_description.filter(|d| !d.is_empty()) {
            Some(description) => format!("token endpoint returned {}: {}: {}", status, err.error, description),
            None => format!("token endpoint returned {}: {}", status, err.error),
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text: String = text.trim().chars().take(512).collect();
            format!("token endpoint returned {}: {}", status, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oidc() -> OidcConfig {
        OidcConfig {
            issuer_url: "http://localhost/issuer".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            ..OidcConfig::default()
        }
    }

    #[test]
    fn grant_prefers_password_then_scope_then_audience() {
        let mut cfg = oidc();
        assert_eq!(Grant::select(&cfg, &[]), Grant::ClientCredentials);

        cfg.audience = Some("observatorium".into());
        assert_eq!(Grant::select(&cfg, &[]), Grant::Audience("observatorium".into()));

        let scopes = vec!["openid".to_string(), "profile".to_string()];
        assert_eq!(Grant::select(&cfg, &scopes), Grant::Scope("openid profile".into()));

        cfg.username = Some("user".into());
        assert_eq!(Grant::select(&cfg, &scopes), Grant::Scope("openid profile".into()));

        cfg.password = Some("pass".into());
        assert_eq!(
            Grant::select(&cfg, &scopes),
            Grant::Password {
                username: "user".into(),
                password: "pass".into()
            }
        );
    }

    #[test]
    fn grant_form_carries_only_its_own_parameters() {
        let audience = Grant::Audience("aud".into());
        let form = audience.form();
        assert_eq!(form, vec![("grant_type", "client_credentials"), ("audience", "aud")]);

        let password = Grant::Password {
            username: "u".into(),
            password: "p".into(),
        };
        let form = password.form();
        assert_eq!(form[0], ("grant_type", "password"));
        assert!(!form.iter().any(|(k, _)| *k == "audience" || *k == "scope"));
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let grant = Grant::Password {
            username: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", grant).contains("hunter2"));
    }

    #[test]
    fn parses_json_response() {
        let now = Utc::now();
        let body = br#"{"access_token":"abc","token_type":"bearer","expires_in":600}"#;
        let token = parse_token_response("application/json; charset=utf-8", body, now).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expiry, Some(now + Duration::seconds(600)));
    }

    #[test]
    fn parses_string_expiry_and_missing_expiry() {
        let now = Utc::now();
        let token = parse_token_response("application/json", br#"{"access_token":"abc","expires_in":"60"}"#, now).unwrap();
        assert_eq!(token.expiry, Some(now + Duration::seconds(60)));

        let token = parse_token_response("application/json", br#"{"access_token":"abc"}"#, now).unwrap();
        assert_eq!(token.expiry, None);
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn out_of_range_expiry_is_a_fetch_error() {
        let body = br#"{"access_token":"abc","expires_in":9223372036854775807}"#;
        let err = parse_token_response("application/json", body, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }), "got {:?}", err);
        assert!(err.to_string().contains("out of range"));

        let body = b"access_token=abc&expires_in=9223372036854775807";
        let err = parse_token_response("application/x-www-form-urlencoded", body, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[test]
    fn parses_form_encoded_response() {
        let now = Utc::now();
        let body = b"access_token=xyz&token_type=bearer&expires_in=30";
        let token = parse_token_response("application/x-www-form-urlencoded", body, now).unwrap();
        assert_eq!(token.access_token, "xyz");
        assert_eq!(token.expiry, Some(now + Duration::seconds(30)));
    }

    #[test]
    fn malformed_response_is_a_fetch_error() {
        let err = parse_token_response("application/json", b"<html>", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[test]
    fn error_response_is_described() {
        let message = describe_error_response(
            http::StatusCode::UNAUTHORIZED,
            br#"{"error":"invalid_client","error_description":"bad secret"}"#,
        );
        assert_eq!(message, "token endpoint returned 401 Unauthorized: invalid_client: bad secret");
    }
}
