//! Dashboard — read-only JSON API over the engine's stored state.
//!
//! CORS enabled for local development. Rendering is left to clients.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use routes::AppState;

/// Bind the dashboard port and serve until the process exits.
pub async fn serve_dashboard(state: AppState, port: u16) -> Result<()> {
    let listener = bind(port).await?;
    axum::serve(listener, build_router(state))
        .await
        .context("Dashboard server error")
}

/// Bind the dashboard port, then serve from a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let listener = bind(port).await?;
    let app = build_router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });
    Ok(())
}

async fn bind(port: u16) -> Result<TcpListener> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");
    Ok(listener)
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/history", get(routes::get_history))
        .route("/api/games/:id", get(routes::get_game))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
