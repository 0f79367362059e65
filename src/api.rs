//! HTTP API

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::{LlmClient, ToolExecutor};
use crate::service::ChatService;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Chat service over trait objects, as wired in `main`
pub type ProductionService = ChatService<Arc<dyn LlmClient>, Arc<dyn ToolExecutor>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProductionService>,
    /// Persistence status reported on `/health`
    pub persistence: &'static str,
}

impl AppState {
    pub fn new(service: ProductionService, persistence: &'static str) -> Self {
        Self {
            service: Arc::new(service),
            persistence,
        }
    }
}

/// Router with the cross-cutting layers every deployment gets
pub fn create_app(state: AppState) -> Router {
    // Browser clients from any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http())
}
