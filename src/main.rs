use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use argoos::app_state::build_app_state;
use argoos::config::Config;
use argoos::core::client::kube_client::KubeConnector;
use argoos::domain::auth::authenticator::Authenticator;
use argoos::domain::rollout::rollout_controller::RolloutController;
use argoos::logging::init_tracing;
use argoos::routes::app_router;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // keeps the file writer flushing until exit
    let _log_guard = init_tracing(config.verbose, config.log_dir.as_deref())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting argoos");

    let authenticator = Authenticator::new(config.auth_token().as_deref());
    if !authenticator.is_enabled() {
        info!("No token configured, registry notifications are not authenticated");
    }

    // certificate problems surface before the cluster is touched
    let tls = match config.server_tls() {
        Some(tls) => Some(
            RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                .await
                .with_context(|| {
                    format!(
                        "failed to load server certificate {} / key {}",
                        tls.cert_file.display(),
                        tls.key_file.display()
                    )
                })?,
        ),
        None => None,
    };

    let connector = Arc::new(KubeConnector::new(config.cluster_settings()));
    let controller = Arc::new(RolloutController::new(connector, config.rollout_settings()));

    if let Err(e) = controller.start().await {
        error!("Failed to start rollout controller: {}", e);
        return Err(e).context("cluster connection failed at startup");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let app = app_router().with_state(build_app_state(authenticator, controller.clone()));

    let served = match tls {
        Some(tls) => serve_https(app, config.listen, tls, shutdown.clone()).await,
        None => serve_http(app, config.listen, shutdown.clone()).await,
    };

    // HTTP is drained, now the rollouts
    controller.stop().await;

    served?;
    info!("Shutdown complete");
    Ok(())
}

async fn serve_http(app: Router, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("🚀 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")
}

async fn serve_https(
    app: Router,
    addr: SocketAddr,
    tls: RustlsConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            // stop accepting, let open requests finish
            handle.graceful_shutdown(None);
        }
    });

    info!("🚀 Listening on https://{}", addr);

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .with_context(|| format!("HTTPS server on {} failed", addr))
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}
