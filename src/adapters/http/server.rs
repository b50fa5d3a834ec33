//! Audit HTTP server.

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use super::state::AppState;
use crate::domain::models::ServerConfig;

/// Build the router with all endpoints.
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        .route("/api/analyze/stream", post(routes::analyze_stream))
        .route("/api/insights", get(routes::get_insights))
        .route("/api/documents", get(routes::list_documents).post(routes::create_document))
        .route(
            "/api/documents/{id}",
            get(routes::get_document).delete(routes::delete_document),
        )
        .route("/health", get(routes::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// HTTP server for the audit API.
pub struct AuditHttpServer {
    state: AppState,
    config: ServerConfig,
}

impl AuditHttpServer {
    /// Create a server bound to the configured address.
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    /// The router with the configured layers applied.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.enable_cors)
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.router();

        tracing::info!("Audit HTTP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}
