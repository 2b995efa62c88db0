use std::future::Future;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// A set of long-running actors sharing one cancellation scope.
///
/// The first actor to return, successfully or not, cancels the scope; every
/// other actor is expected to observe the cancellation and unwind. `run`
/// resolves once all actors are done, with the first actor's result.
pub struct RunGroup {
    shutdown: CancellationToken,
    actors: JoinSet<(&'static str, Result<()>)>,
}

impl Default for RunGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl RunGroup {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            actors: JoinSet::new(),
        }
    }

    /// Token every actor must watch.
    pub fn shutdown(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, actor: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!("starting actor {}", name);
        self.actors
            .spawn(async move { (name, actor.await) }.in_current_span());
    }

    pub async fn run(mut self) -> Result<()> {
        let first = match self.actors.join_next().await {
            Some(joined) => flatten(joined),
            None => return Ok(()),
        };
        self.shutdown.cancel();

        while let Some(joined) = self.actors.join_next().await {
            if let Err(err) = flatten(joined) {
                error!("actor failed during shutdown: {:#}", err);
            }
        }
        first
    }
}

fn flatten(joined: std::result::Result<(&'static str, Result<()>), tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok((name, result)) => {
            debug!("actor {} finished", name);
            result.map_err(|err| err.context(format!("{} failed", name)))
        }
        Err(err) => Err(anyhow::anyhow!("actor panicked or was aborted: {}", err)),
    }
}

/// Resolve on SIGINT or SIGTERM, or when `shutdown` is cancelled elsewhere.
pub async fn wait_for_signal(shutdown: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("caught interrupt"),
        _ = sigterm.recv() => info!("caught interrupt"),
        _ = shutdown.cancelled() => {}
    }
    Ok(())
}
