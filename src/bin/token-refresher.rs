use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tracing::{info, info_span, Instrument};

use token_refresher::cache::token_cache;
use token_refresher::config::args::Args;
use token_refresher::config::settings::Settings;
use token_refresher::observability::service_resources_metrics::collect_process_metrics;
use token_refresher::proxy::forwarder::{build_upstream_client, ProxyState, Upstream};
use token_refresher::resilience::retry::RefreshPolicy;
use token_refresher::scheduler::refresh::RefreshScheduler;
use token_refresher::server::server::{self, ServerTimeouts};
use token_refresher::sinks::sink_file::FileSink;
use token_refresher::sources::oauth2::OAuth2Source;
use token_refresher::utils::group::{wait_for_signal, RunGroup};
use token_refresher::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Parse and validate flags
    // -------------------------------

    let args = Args::parse();
    let settings = Settings::from_args(args)?;

    // -------------------------------
    // 2. Set up logging
    // -------------------------------

    logging::init_logging(&settings.logging);
    let root = info_span!("token-refresher", name = %settings.logging.name);

    let result = run(settings).instrument(root.clone()).await;
    root.in_scope(|| info!("exiting"));
    result
}

async fn run(settings: Settings) -> Result<()> {
    info!("token-refresher");

    // -------------------------------
    // 3. Upstream wiring, before any network call or task
    // -------------------------------

    let proxy = match &settings.upstream {
        Some(upstream_config) => Some((
            Upstream::from_url(&upstream_config.url)?,
            build_upstream_client(upstream_config)?,
            ServerTimeouts {
                read: upstream_config.read_timeout,
                write: upstream_config.write_timeout,
            },
        )),
        None => None,
    };

    // -------------------------------
    // 4. Discover the issuer's token endpoint
    // -------------------------------

    let oauth_client = Client::builder()
        .build()
        .context("cannot build OAuth HTTP client")?;
    let source = Arc::new(OAuth2Source::discover(oauth_client, &settings.oidc, &settings.scopes).await?);
    info!(grant = source.grant().kind(), "token source ready");

    let policy = RefreshPolicy::new(settings.margin);
    let mut group = RunGroup::new();

    // -------------------------------
    // 5. Signal handler, internal server, process metrics
    // -------------------------------

    group.spawn("signal", wait_for_signal(group.shutdown()));

    let listen_internal = settings.server.listen_internal.clone();
    let shutdown = group.shutdown();
    group.spawn("internal-server", async move {
        server::start_internal(&listen_internal, shutdown).await
    });

    group.spawn("process-metrics", collect_process_metrics(group.shutdown()));

    // -------------------------------
    // 6. File mode: keep the token file fresh
    // -------------------------------

    if let Some(target) = settings.file.clone() {
        info!("writing token to {}", target.path.display());
        let scheduler = RefreshScheduler::new(source.clone(), FileSink::new(target), policy);
        group.spawn("file-refresher", scheduler.run(group.shutdown()));
    }

    // -------------------------------
    // 7. Proxy mode: inject the live token into upstream requests
    // -------------------------------

    if let Some((upstream, upstream_client, timeouts)) = proxy {
        let (writer, tokens) = token_cache::channel();
        let scheduler = RefreshScheduler::new(source.clone(), writer, policy);
        group.spawn("proxy-refresher", scheduler.run(group.shutdown()));

        let state = ProxyState::new(upstream, upstream_client, tokens);
        let listen = settings.server.listen.clone();
        let shutdown = group.shutdown();
        group.spawn("proxy-server", async move {
            server::start_proxy(&listen, state, timeouts, shutdown).await
        });
    }

    group.run().await
}
