//! Document API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use docflow_core::{
    Document, DocumentState, IncomingDocument, IngestError, Stage, StateFilter,
};

use crate::state::AppState;

/// Maximum allowed limit for state queries
const MAX_LIMIT: usize = 1000;

/// Default limit for state queries
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a document
#[derive(Debug, Deserialize)]
pub struct SubmitDocumentBody {
    /// Document id; generated when absent
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Size of the source file, if different from the content length
    pub size_bytes: Option<u64>,
}

/// Response for an accepted submission
#[derive(Debug, Serialize)]
pub struct SubmitDocumentResponse {
    pub id: String,
    pub status: String,
}

/// Query parameters for listing document states
#[derive(Debug, Deserialize)]
pub struct ListDocumentsParams {
    /// Filter by current stage (e.g. "CLARIFIED")
    pub stage: Option<String>,
    /// Maximum number of states to return
    pub limit: Option<usize>,
}

/// Response for listing document states
#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentState>,
    pub limit: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct DocumentErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> (StatusCode, Json<DocumentErrorResponse>) {
    (
        status,
        Json(DocumentErrorResponse {
            error: error.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue a document for processing
pub async fn submit_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitDocumentBody>,
) -> Result<(StatusCode, Json<SubmitDocumentResponse>), impl IntoResponse> {
    let mut incoming = IncomingDocument::new(body.content);
    if let Some(id) = body.id {
        if id.trim().is_empty() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Document id cannot be empty",
            ));
        }
        incoming = incoming.with_id(id);
    }
    incoming.metadata = body.metadata;
    incoming.size_bytes = body.size_bytes;

    match state.queue().enqueue(incoming).await {
        Ok(id) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitDocumentResponse {
                id,
                status: "queued".to_string(),
            }),
        )),
        Err(e @ (IngestError::QueueFull { .. } | IngestError::NotRunning)) => {
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, e))
        }
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, impl IntoResponse> {
    match state.store().get_document(&id) {
        Ok(Some(document)) => Ok(Json(document)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Document not found: {}", id),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// Get a document's processing state
pub async fn get_document_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentState>, impl IntoResponse> {
    match state.store().get_state(&id) {
        Ok(Some(doc_state)) => Ok(Json(doc_state)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("No state for document: {}", id),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// List document states with optional stage filter
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<ListDocumentsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let mut filter = StateFilter::new().with_limit(limit);

    if let Some(ref stage) = params.stage {
        match stage.parse::<Stage>() {
            Ok(stage) => filter = filter.with_stage(stage),
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        }
    }

    match state.store().list_states(&filter) {
        Ok(documents) => Ok(Json(ListDocumentsResponse { documents, limit })),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}
