mod bootstrap;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mosaic_api::reconciler::run_reconcile_loop;
use mosaic_api::{ApiSettings, AppStateInner};
use mosaic_blob::BlobStore;
use mosaic_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic=debug,mosaic_api=debug,mosaic_db=debug,mosaic_blob=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init stores
    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = BlobStore::new(config.blob.clone(), config.blob_public_url.as_deref()).await?;

    if let Some(credentials) = config.bootstrap_admin.as_deref() {
        bootstrap::ensure_admin(&db, credentials)?;
    }

    let mut settings = ApiSettings::new(config.jwt_secret.clone());
    settings.api_key = config.api_key.clone();
    settings.upload_max_bytes = config.upload_max_bytes;
    settings.reconcile_window = config.reconcile_window;
    let state = AppStateInner::new(db, blobs, settings);

    // Background reconciler, out of the request path
    if config.reconcile_interval_secs > 0 {
        tokio::spawn(run_reconcile_loop(
            state.reconciler.clone(),
            Duration::from_secs(config.reconcile_interval_secs),
            config.reconcile_repair,
        ));
        info!(
            "Reconciler every {}s (repair: {})",
            config.reconcile_interval_secs, config.reconcile_repair
        );
    }
    if config.api_key.is_none() {
        warn!("MOSAIC_API_KEY not set; admin routes are disabled");
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = mosaic_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Mosaic server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
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
