use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::token::Token;

/// Reader side of the live token: cheap to clone, never blocks on a fetch.
///
/// The refresh scheduler installs a whole new snapshot on every successful
/// refresh, so readers see either the previous token or the new one.
#[derive(Clone, Debug)]
pub struct TokenCache {
    rx: watch::Receiver<Option<Arc<Token>>>,
}

/// Writer side of the live token. Owned by exactly one refresh scheduler.
#[derive(Debug)]
pub struct TokenCacheWriter {
    tx: watch::Sender<Option<Arc<Token>>>,
}

pub fn channel() -> (TokenCacheWriter, TokenCache) {
    let (tx, rx) = watch::channel(None);
    (TokenCacheWriter { tx }, TokenCache { rx })
}

impl TokenCache {
    /// Last installed token, if it is still valid.
    pub fn get(&self) -> Option<Arc<Token>> {
        self.rx
            .borrow()
            .as_ref()
            .filter(|token| token.valid())
            .cloned()
    }

    /// Last installed token regardless of validity.
    pub fn latest(&self) -> Option<Arc<Token>> {
        self.rx.borrow().clone()
    }
}

impl TokenCacheWriter {
    pub fn set(&self, token: Token) {
        self.tx.send_replace(Some(Arc::new(token)));
    }

    pub fn subscribe(&self) -> TokenCache {
        TokenCache {
            rx: self.tx.subscribe(),
        }
    }
}
