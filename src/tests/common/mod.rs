// src/tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use reqwest::Client;

use crate::cache::token::Token;
use crate::error::{Error, Result};
use crate::sinks::TokenSink;
use crate::sources::FetchToken;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Token that expires `secs` seconds from now.
pub fn token_expiring_in(value: &str, secs: i64) -> Token {
    Token::new(value, Some(Utc::now() + Duration::seconds(secs)))
}

/// Token source replaying a fixed script of results, failing once exhausted.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Token>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Token>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchToken for ScriptedSource {
    async fn fetch_token(&self) -> Result<Token> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(Error::fetch("issuer unavailable")))
    }
}

/// Sink remembering every published token; can be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    pub published: Mutex<Vec<Token>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.access_token.clone())
            .collect()
    }
}

impl TokenSink for RecordingSink {
    fn mode(&self) -> &'static str {
        "test"
    }

    async fn publish(&self, token: &Token) -> Result<()> {
        if self.fail {
            return Err(Error::Publish {
                path: "/nonexistent/token".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.published.lock().unwrap().push(token.clone());
        Ok(())
    }
}
