//! Ingestion API handlers.

use axum::{extract::State, Json};
use std::sync::Arc;
use docflow_core::IngestionStats;

use crate::state::AppState;

/// Get ingestion queue counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<IngestionStats> {
    Json(state.queue().stats())
}
