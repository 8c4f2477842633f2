use std::sync::Arc;

use clap::Parser;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nirn_proxy::api::{self, AppState};
use nirn_proxy::cli;
use nirn_proxy::cluster::{self, PeerTable};
use nirn_proxy::global::{GlobalGrantClient, GlobalLimiter};
use nirn_proxy::limiters::GlobalRateLimiter;

const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nirn_proxy=info,tower_http=info".into());
    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let socket_address = settings.socket_address()?;
    let global = GlobalLimiter::new(
        Arc::new(GlobalRateLimiter::new()),
        GlobalGrantClient::new(settings.request_timeout())?,
    );
    let peers = Arc::new(PeerTable::default());
    let api = api::api(AppState::new(global, peers.clone())).await?;

    // Start server
    let shutdown = CancellationToken::new();
    let server = axum::Server::try_bind(&socket_address)?
        .serve(api.into_make_service())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let server = tokio::spawn(server);
    info!("Started proxy on {}", socket_address);

    // Engine failures are fatal, join failures are logged
    let membership = cluster::init_cluster(&settings.cluster, peers).await?;

    shutdown_signal().await;
    info!("Server received shutdown signal");

    if let Some(membership) = membership {
        info!("Broadcasting leave message to cluster");
        if let Err(err) = membership.leave(LEAVE_TIMEOUT).await {
            error!(error = %err, "Failed to leave cluster");
        }
        membership.shutdown().await;
    }

    info!("Gracefully shutting down HTTP server");
    shutdown.cancel();
    match tokio::time::timeout(HTTP_SHUTDOWN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => error!(error = %err, "HTTP server failed"),
        Ok(Err(err)) => error!(error = %err, "HTTP server task failed"),
        Err(_) => error!("Failed to gracefully shutdown HTTP server"),
    }

    info!("Bye bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
