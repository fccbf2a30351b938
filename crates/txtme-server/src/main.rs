mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use txtme_api::rate_limit::AbuseGuard;
use txtme_api::storage::AudioStore;
use txtme_api::{AppState, AppStateInner};
use txtme_db::Database;
use txtme_notify::{Dispatcher, ExpoProvider};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "txtme=debug,txtme_api=debug,txtme_notify=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("TXTME_JWT_SECRET is unset; signing credentials with the development key");
    }

    let db = Database::open(&config.db_path)?;
    let audio = AudioStore::new(config.upload_dir.clone()).await?;

    let provider = ExpoProvider::new(config.push_url.clone(), config.push_timeout)?;
    let dispatcher = Dispatcher::new(Arc::new(provider), config.push_timeout);

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher,
        guard: AbuseGuard::new(config.send_limit, config.send_window),
        audio,
    });

    match config.sweep_interval {
        Some(every) => {
            tokio::spawn(cleanup::run_cleanup_loop(state.clone(), every));
        }
        None => info!("Expiry sweep disabled; expired messages burn on read only"),
    }

    let app = txtme_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr()?;
    info!("Txtme server listening on {}", addr);
    info!(
        "Send limit: {} per {}s per address",
        config.send_limit,
        config.send_window.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
