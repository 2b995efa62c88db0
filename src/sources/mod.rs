use std::future::Future;
use std::sync::Arc;

use crate::cache::token::Token;
use crate::error::Result;

pub mod discovery;
pub mod oauth2;

/// Anything that can produce a fresh token. Implementations never retry;
/// retrying is the refresh scheduler's job.
pub trait FetchToken: Send + Sync {
    fn fetch_token(&self) -> impl Future<Output = Result<Token>> + Send;
}

impl<T: FetchToken> FetchToken for Arc<T> {
    fn fetch_token(&self) -> impl Future<Output = Result<Token>> + Send {
        self.as_ref().fetch_token()
    }
}
