use std::fmt;

use chrono::{DateTime, Utc};

/// A bearer token returned by the issuer.
///
/// Tokens are never mutated; a refresh produces a new value that supersedes
/// the previous one.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    /// `None` when the issuer did not send `expires_in`.
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expiry,
        }
    }

    /// A token is usable while it is non-empty and not yet expired.
    pub fn valid(&self) -> bool {
        self.valid_at(Utc::now())
    }

    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expiry.map_or(true, |exp| now < exp)
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}
