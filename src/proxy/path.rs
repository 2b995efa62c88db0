//! Joining of the upstream base path with an incoming request path.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters that must be escaped in a URL path segment list.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'^')
    .add(b'|')
    .add(b'[')
    .add(b']');

/// A URL path in decoded form, plus the escaped form when it cannot be
/// recovered by re-encoding the decoded one (for example `%2F` inside a
/// segment).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlPath {
    pub path: String,
    pub raw_path: Option<String>,
}

impl UrlPath {
    /// Build from a path as it appears on the wire.
    pub fn from_escaped(escaped: &str) -> Self {
        let path = percent_decode_str(escaped).decode_utf8_lossy().into_owned();
        let raw_path = if default_escape(&path) == escaped {
            None
        } else {
            Some(escaped.to_owned())
        };
        Self { path, raw_path }
    }

    /// Wire form of the path.
    pub fn escaped(&self) -> Cow<'_, str> {
        match &self.raw_path {
            Some(raw) => Cow::Borrowed(raw.as_str()),
            None => default_escape(&self.path),
        }
    }
}

fn default_escape(path: &str) -> Cow<'_, str> {
    utf8_percent_encode(path, PATH).into()
}

/// Concatenate two paths with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    let a_slash = a.ends_with('/');
    let b_slash = b.starts_with('/');
    match (a_slash, b_slash) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

/// Join base and incoming paths. Plain paths use a single slash join; when
/// either side carries an escaped form both forms are joined with the same
/// slash rule so they stay consistent.
pub fn join_url_path(a: &UrlPath, b: &UrlPath) -> UrlPath {
    if a.raw_path.is_none() && b.raw_path.is_none() {
        return UrlPath {
            path: single_joining_slash(&a.path, &b.path),
            raw_path: None,
        };
    }

    let a_escaped = a.escaped();
    let b_escaped = b.escaped();
    let a_slash = a_escaped.ends_with('/');
    let b_slash = b_escaped.starts_with('/');

    let (path, raw_path) = match (a_slash, b_slash) {
        (true, true) => (
            format!("{}{}", a.path, b.path.get(1..).unwrap_or_default()),
            format!("{}{}", a_escaped, &b_escaped[1..]),
        ),
        (false, false) => (
            format!("{}/{}", a.path, b.path),
            format!("{}/{}", a_escaped, b_escaped),
        ),
        _ => (
            format!("{}{}", a.path, b.path),
            format!("{}{}", a_escaped, b_escaped),
        ),
    };
    UrlPath {
        path,
        raw_path: Some(raw_path),
    }
}
