use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::settings::LogFormat;
use crate::helpers::time::parse_duration;
use crate::utils::logging::LogLevel;

/// Command line surface. Every flag that the daemon historically read from the
/// environment keeps its variable name.
#[derive(Parser, Debug, Clone)]
#[command(name = "token-refresher", author, version, about, long_about = None)]
pub struct Args {
    /// A name to add as a prefix to log lines.
    #[arg(long = "debug.name", default_value = "token-refresher")]
    pub name: String,

    /// The log filtering level.
    #[arg(long = "log.level", env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// The log format to use.
    #[arg(long = "log.format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Logfmt)]
    pub log_format: LogFormat,

    /// The address on which the internal server listens.
    #[arg(long = "web.internal.listen", env = "WEB_INTERNAL_LISTEN", default_value = ":8081")]
    pub listen_internal: String,

    /// The address on which the proxy server listens.
    #[arg(long = "web.listen", env = "WEB_LISTEN", default_value = ":8080")]
    pub listen: String,

    /// The OIDC issuer URL, see https://openid.net/specs/openid-connect-discovery-1_0.html#IssuerDiscovery.
    #[arg(long = "oidc.issuer-url", env = "OIDC_ISSUER_URL", default_value = "")]
    pub issuer_url: String,

    /// The OIDC client secret, see https://tools.ietf.org/html/rfc6749#section-2.3.
    #[arg(long = "oidc.client-secret", env = "OIDC_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// The OIDC client ID, see https://tools.ietf.org/html/rfc6749#section-2.3.
    #[arg(long = "oidc.client-id", env = "OIDC_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// The audience for whom the access token is intended.
    #[arg(long = "oidc.audience", env = "OIDC_AUDIENCE", default_value = "")]
    pub audience: String,

    /// Username for the password grant; used together with --oidc.password.
    #[arg(long = "oidc.username", default_value = "")]
    pub username: String,

    /// Password for the password grant; used together with --oidc.username.
    #[arg(long = "oidc.password", default_value = "")]
    pub password: String,

    /// Scopes to request. Comma- or space-separated, repeatable.
    #[arg(long = "scope", value_delimiter = ',')]
    pub scope: Vec<String>,

    /// The path to the file in which to write the retrieved token.
    #[arg(long = "file", env = "FILE")]
    pub file: Option<PathBuf>,

    /// Temporary file used to update the token file atomically. Defaults to `<file>.tmp`.
    #[arg(long = "temp-file", env = "TEMP_FILE")]
    pub temp_file: Option<PathBuf>,

    /// The target URL to which to proxy requests. (DEPRECATED: Use --upstream.url instead)
    #[arg(long = "url", env = "URL")]
    pub url: Option<String>,

    /// The target URL to which to proxy requests. All requests carry the access token.
    #[arg(long = "upstream.url")]
    pub upstream_url: Option<String>,

    /// The path to the CA file to verify upstream server TLS certificates.
    #[arg(long = "upstream.ca-file")]
    pub upstream_ca_file: Option<PathBuf>,

    /// Time allowed for reading a proxied request body. 0 disables the limit.
    #[arg(long = "upstream.read-timeout", value_parser = parse_duration, default_value = "0")]
    pub upstream_read_timeout: Duration,

    /// Time allowed for answering a proxied request. 0 disables the limit.
    #[arg(long = "upstream.write-timeout", value_parser = parse_duration, default_value = "0")]
    pub upstream_write_timeout: Duration,

    /// The margin of time before a token expires to try to refresh it.
    #[arg(long = "margin", value_parser = parse_duration, default_value = "5m")]
    pub margin: Duration,
}
