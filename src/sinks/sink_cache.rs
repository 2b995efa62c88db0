use crate::cache::token::Token;
use crate::cache::token_cache::TokenCacheWriter;
use crate::error::Result;
use crate::sinks::TokenSink;

static PROXY_MSG: &str = "proxy";

/// Installs fetched tokens as the live token read by the proxy.
impl TokenSink for TokenCacheWriter {
    fn mode(&self) -> &'static str {
        PROXY_MSG
    }

    async fn publish(&self, token: &Token) -> Result<()> {
        self.set(token.clone());
        Ok(())
    }
}
