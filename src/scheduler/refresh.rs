use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::helpers::time::now;
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RefreshPolicy;
use crate::sinks::TokenSink;
use crate::sources::FetchToken;

/// Keeps one sink supplied with a valid token.
///
/// Each cycle fetches a token, publishes it and sleeps until `margin` before
/// its expiry. A failed fetch or publish is retried after the fixed retry
/// interval; the loop only ends when `shutdown` is cancelled.
pub struct RefreshScheduler<S, K> {
    source: S,
    sink: K,
    policy: RefreshPolicy,
}

impl<S, K> RefreshScheduler<S, K>
where
    S: FetchToken,
    K: TokenSink,
{
    pub fn new(source: S, sink: K, policy: RefreshPolicy) -> Self {
        Self {
            source,
            sink,
            policy,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run until cancelled. Never returns an error for fetch or publish
    /// failures.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mode = self.sink.mode();
        info!(mode, "token refresh loop started");

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                wake = self.refresh_once() => wake,
            };

            let delay = self.policy.sleep_for(wake);
            debug!(mode, "next token refresh in {:?}", delay);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(mode, "token refresh loop stopped");
        Ok(())
    }

    /// One fetch-and-publish cycle. Returns how long to wait before the next.
    pub async fn refresh_once(&self) -> Duration {
        let metrics = get_metrics().await;
        let mode = self.sink.mode();

        let token = match self.source.fetch_token().await {
            Ok(token) => token,
            Err(err) => {
                match &err {
                    Error::InvalidToken { expiry } => {
                        error!(mode, exp = ?expiry, "token is invalid");
                    }
                    _ => error!(mode, err = %err, "failed to get token"),
                }
                metrics.token_refresh_failures.with_label_values(&[mode, err.reason()]).inc();
                return self.policy.retry_interval;
            }
        };

        if let Err(err) = self.sink.publish(&token).await {
            error!(mode, err = %err, "failed to publish token");
            metrics.token_refresh_failures.with_label_values(&[mode, err.reason()]).inc();
            return self.policy.retry_interval;
        }

        metrics.token_refreshes.with_label_values(&[mode]).inc();
        if let Some(expiry) = token.expiry {
            metrics.token_expiry_unix.with_label_values(&[mode]).set(expiry.timestamp());
        }
        info!(mode, exp = ?token.expiry, "token refreshed");

        self.policy.next_wake(token.expiry, now())
    }
}
