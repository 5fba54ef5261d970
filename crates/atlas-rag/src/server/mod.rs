//! HTTP server for the knowledge service

pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{Error, Result};
use state::AppState;

/// Knowledge service HTTP server
pub struct AppServer {
    state: AppState,
}

impl AppServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes
    fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes())
            .layer(DefaultBodyLimit::max(self.state.config().server.max_body_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors)
    }

    /// Bind and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let config = &self.state.config().server;
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| Error::Internal(format!("invalid listen address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("server error: {}", e)))?;
        Ok(())
    }
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}
