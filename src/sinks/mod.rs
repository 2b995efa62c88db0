use std::future::Future;

use crate::cache::token::Token;
use crate::error::Result;

pub mod sink_cache;
pub mod sink_file;

/// Destination of a freshly fetched token.
pub trait TokenSink: Send + Sync {
    /// Short name used in logs and metric labels (`file`, `proxy`).
    fn mode(&self) -> &'static str;

    fn publish(&self, token: &Token) -> impl Future<Output = Result<()>> + Send;
}

impl<T: TokenSink> TokenSink for std::sync::Arc<T> {
    fn mode(&self) -> &'static str {
        self.as_ref().mode()
    }

    fn publish(&self, token: &Token) -> impl Future<Output = Result<()>> + Send {
        self.as_ref().publish(token)
    }
}
