use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    services::{detect, health, index, output, ui},
    state::AppState,
};
use crate::config::Config;
use crate::detector::{Detector, HttpDetector};
use crate::storage::ArtifactStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the router with all routes and middleware
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes.as_usize();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/detect", post(detect))
        .route("/output/{*path}", get(output))
        .route("/ui", get(ui))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    info!(
        uploads = %config.storage.uploads_root.display(),
        results = %config.storage.results_root.display(),
        "Opening artifact store"
    );
    let store = ArtifactStore::from_config(&config.storage)
        .map_err(|e| format!("Failed to open artifact store: {}", e))?;

    let detector = HttpDetector::new(&config.detector)
        .map_err(|e| format!("Failed to build detector client: {}", e))?;

    // the sidecar may still be loading its model; requests will surface failures per file
    match detector.health().await {
        Ok(()) => info!(endpoint = detector.endpoint(), "Detector reachable"),
        Err(e) => warn!(endpoint = detector.endpoint(), error = %e, "Detector not ready"),
    }

    let address = config.server.bind_addr;
    let detector: Arc<dyn Detector> = Arc::new(detector);
    let app = router(AppState::new(config, store, detector));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "leafscan API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
