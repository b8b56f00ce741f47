//! API server - HTTP surface for the chat-transport adapter

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};
use crate::error::Result;

/// HTTP server exposing the engine's operations.
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>, addr: String) -> Self {
        Self { state, addr }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/deliver", post(handlers::deliver))
            .route("/api/callback", post(handlers::callback))
            .route("/api/register", post(handlers::register))
            .route("/api/grant", post(handlers::grant))
            .route("/api/catalog", post(handlers::ingest))
            .route(
                "/api/entitlements/:user_id/:subject/:tier",
                get(handlers::get_entitlement),
            )
            .route("/api/stats/subscribers", get(handlers::subscribers))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("API listening on {}", self.addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
