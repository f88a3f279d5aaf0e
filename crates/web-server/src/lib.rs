use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use supervisor::Supervisor;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;

/// The shared application state every handler gets: the one supervisor
/// instance the root binary already built and started.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

/// Builds the router for the dashboard HTTP contract (spec §6). Kept
/// separate from [`run_server`] so tests can exercise routes without
/// binding a socket.
pub fn app(supervisor: Arc<Supervisor>) -> Router {
    let state = Arc::new(AppState { supervisor });
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/overview", get(handlers::overview))
        .route("/api/bot", post(handlers::create_bot))
        .route("/api/bot/:id", get(handlers::bot_detail))
        .route("/api/bot/:id", patch(handlers::update_bot))
        .route("/api/bot/:id", delete(handlers::delete_bot))
        .route("/api/bot/:id/start", post(handlers::start_bot))
        .route("/api/bot/:id/stop", post(handlers::stop_bot))
        .route("/api/bot/:id/add-funds", post(handlers::add_funds))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

/// Runs the dashboard HTTP server against an already-bootstrapped
/// supervisor (spec §6). The root binary owns building and starting the
/// supervisor; this crate only exposes it over HTTP.
pub async fn run_server(addr: SocketAddr, supervisor: Arc<Supervisor>) -> anyhow::Result<()> {
    let app = app(supervisor);
    tracing::info!(%addr, "dashboard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
