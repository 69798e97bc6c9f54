use axum::{
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{documents, handlers, ingestion, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Documents
        .route(
            "/documents",
            get(documents::list_documents).post(documents::submit_document),
        )
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}/state", get(documents::get_document_state))
        // Ingestion
        .route("/ingestion/stats", get(ingestion::get_stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
