use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use url::Url;

use crate::config::args::Args;
use crate::error::{Error, Result};
use crate::utils::logging::LogLevel;

/// ================================
/// Validated, immutable runtime settings
/// ================================
#[derive(Debug, Clone)]
pub struct Settings {
    pub oidc: OidcConfig,
    /// Scopes to request, already split on commas and whitespace.
    pub scopes: Vec<String>,
    pub margin: Duration,
    pub file: Option<FileTarget>,
    pub upstream: Option<UpstreamConfig>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Publish target of the file mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub path: PathBuf,
    pub temp_path: PathBuf,
}

impl FileTarget {
    pub fn new(path: PathBuf, temp_path: Option<PathBuf>) -> Self {
        let temp_path = temp_path.unwrap_or_else(|| {
            let mut raw = path.clone().into_os_string();
            raw.push(".tmp");
            PathBuf::from(raw)
        });
        Self { path, temp_path }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: Url,
    pub ca_file: Option<PathBuf>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub listen_internal: String,
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact key/value lines
    Logfmt,
    Json,
}

impl Settings {
    /// Validate the raw flags. Any failure here is fatal and happens before
    /// a single network call is made.
    pub fn from_args(args: Args) -> Result<Self> {
        let url = non_empty(args.url);
        let upstream_url = non_empty(args.upstream_url);

        if url.is_some() && upstream_url.is_some() {
            return Err(Error::config("use only one of --url or --upstream.url"));
        }

        let upstream = match url.or(upstream_url) {
            Some(raw) => Some(UpstreamConfig {
                url: parse_upstream_url(&raw)?,
                ca_file: args.upstream_ca_file.filter(|p| !p.as_os_str().is_empty()),
                read_timeout: Some(args.upstream_read_timeout).filter(|d| !d.is_zero()),
                write_timeout: Some(args.upstream_write_timeout).filter(|d| !d.is_zero()),
            }),
            None => None,
        };

        let file = args
            .file
            .filter(|p| !p.as_os_str().is_empty())
            .map(|path| FileTarget::new(path, args.temp_file.filter(|p| !p.as_os_str().is_empty())));

        if file.is_none() && upstream.is_none() {
            return Err(Error::config("one of --file or --upstream.url is required"));
        }

        if args.issuer_url.trim().is_empty() {
            return Err(Error::config("--oidc.issuer-url is required"));
        }

        Ok(Self {
            oidc: OidcConfig {
                issuer_url: args.issuer_url,
                client_id: args.client_id,
                client_secret: args.client_secret,
                audience: non_empty(Some(args.audience)),
                username: non_empty(Some(args.username)),
                password: non_empty(Some(args.password)),
            },
            scopes: split_scopes(&args.scope),
            margin: args.margin,
            file,
            upstream,
            server: ServerConfig {
                listen: normalize_listen_addr(&args.listen),
                listen_internal: normalize_listen_addr(&args.listen_internal),
            },
            logging: LoggingConfig {
                level: args.log_level,
                format: args.log_format,
                name: args.name,
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_upstream_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::config(format!("invalid upstream URL '{}': {}", raw, e)))?;
    if url.host_str().is_none() {
        return Err(Error::config(format!("upstream URL '{}' has no host", raw)));
    }
    Ok(url)
}

fn split_scopes(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|s| s.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `:8080` binds every interface.
pub fn normalize_listen_addr(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_owned()
    }
}
