//! REST API over the schema editor
//!
//! - GET    /api/schema                         - Tables, edges and history flags
//! - PUT    /api/schema                         - Replace the table list
//! - DELETE /api/schema                         - Remove every table
//! - POST   /api/schema/tables                  - Add a table
//! - PUT    /api/schema/tables/{id}             - Update a table
//! - DELETE /api/schema/tables/{id}             - Delete a table
//! - PATCH  /api/schema/tables/{id}/position    - Move a table
//! - POST   /api/schema/layout                  - Recompute all positions
//! - POST   /api/schema/undo, /api/schema/redo  - History navigation
//! - POST   /api/schema/actions                 - Apply a mutation proposal
//! - POST   /api/schema/generate                - Ask the AI backend for mutations
//! - POST   /api/schema/backup/restore          - Restore from the backup store

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};

use super::actions::MutationProposal;
use super::editor::{BatchReport, EditorError, SchemaEditor, SchemaView};
use super::mutation_source::{MutationSource, SourceError};
use super::schema::{Position, Table, TableDraft};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    /// Overrides the configured destructive-actions flag for this request
    #[serde(default)]
    pub allow_destructive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveResponse {
    pub moved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: ApiErrorCode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    Busy,
    TableNotFound,
    DuplicateName,
    InvalidInput,
    CapacityExceeded,
    NothingToUndo,
    NothingToRedo,
    NoBackup,
    SourceFailed,
    InternalError,
}

impl EditorError {
    fn status_and_code(&self) -> (StatusCode, ApiErrorCode) {
        match self {
            EditorError::Busy => (StatusCode::CONFLICT, ApiErrorCode::Busy),
            EditorError::TableNotFound(_) => (StatusCode::NOT_FOUND, ApiErrorCode::TableNotFound),
            EditorError::DuplicateName(_) => (StatusCode::CONFLICT, ApiErrorCode::DuplicateName),
            EditorError::InvalidInput(_) => (StatusCode::BAD_REQUEST, ApiErrorCode::InvalidInput),
            EditorError::Capacity { .. } => {
                (StatusCode::BAD_REQUEST, ApiErrorCode::CapacityExceeded)
            }
            EditorError::NothingToUndo => (StatusCode::CONFLICT, ApiErrorCode::NothingToUndo),
            EditorError::NothingToRedo => (StatusCode::CONFLICT, ApiErrorCode::NothingToRedo),
            EditorError::NoBackup => (StatusCode::NOT_FOUND, ApiErrorCode::NoBackup),
            EditorError::Source(SourceError::NotConfigured) => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiErrorCode::SourceFailed)
            }
            EditorError::Source(_) => (StatusCode::BAD_GATEWAY, ApiErrorCode::SourceFailed),
            EditorError::Backup(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for EditorError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "schema request failed");
        }
        (
            status,
            Json(ApiError {
                error: self.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

type EditorState<S> = State<Arc<SchemaEditor<S>>>;

// ============================================================================
// Router
// ============================================================================

pub fn schema_router<S: MutationSource + 'static>(editor: Arc<SchemaEditor<S>>) -> Router {
    Router::new()
        .route(
            "/api/schema",
            get(get_schema::<S>)
                .put(replace_schema::<S>)
                .delete(clear_schema::<S>),
        )
        .route("/api/schema/tables", post(add_table::<S>))
        .route(
            "/api/schema/tables/{id}",
            put(update_table::<S>).delete(delete_table::<S>),
        )
        .route("/api/schema/tables/{id}/position", patch(move_table::<S>))
        .route("/api/schema/layout", post(auto_layout::<S>))
        .route("/api/schema/undo", post(undo::<S>))
        .route("/api/schema/redo", post(redo::<S>))
        .route("/api/schema/actions", post(apply_actions::<S>))
        .route("/api/schema/generate", post(generate::<S>))
        .route("/api/schema/backup/restore", post(restore_backup::<S>))
        .with_state(editor)
}

// ============================================================================
// API Handlers
// ============================================================================

async fn get_schema<S: MutationSource>(State(editor): EditorState<S>) -> Json<SchemaView> {
    Json(editor.snapshot().await)
}

async fn replace_schema<S: MutationSource>(
    State(editor): EditorState<S>,
    Json(tables): Json<Vec<Table>>,
) -> Result<Json<SchemaView>, EditorError> {
    Ok(Json(editor.set_tables(tables).await?))
}

async fn clear_schema<S: MutationSource>(State(editor): EditorState<S>) -> Json<SchemaView> {
    Json(editor.clear().await)
}

async fn add_table<S: MutationSource>(
    State(editor): EditorState<S>,
    Json(draft): Json<TableDraft>,
) -> Result<impl IntoResponse, EditorError> {
    let table = editor.add_table(draft).await?;
    Ok((StatusCode::CREATED, Json(table)))
}

async fn update_table<S: MutationSource>(
    State(editor): EditorState<S>,
    Path(id): Path<String>,
    Json(draft): Json<TableDraft>,
) -> Result<Json<Table>, EditorError> {
    Ok(Json(editor.update_table(&id, draft).await?))
}

async fn delete_table<S: MutationSource>(
    State(editor): EditorState<S>,
    Path(id): Path<String>,
) -> Result<Json<Table>, EditorError> {
    Ok(Json(editor.delete_table(&id).await?))
}

async fn move_table<S: MutationSource>(
    State(editor): EditorState<S>,
    Path(id): Path<String>,
    Json(position): Json<Position>,
) -> Result<Json<MoveResponse>, EditorError> {
    let moved = editor.move_table(&id, position).await?;
    Ok(Json(MoveResponse { moved }))
}

async fn auto_layout<S: MutationSource>(State(editor): EditorState<S>) -> Json<SchemaView> {
    Json(editor.auto_layout().await)
}

async fn undo<S: MutationSource>(
    State(editor): EditorState<S>,
) -> Result<Json<SchemaView>, EditorError> {
    Ok(Json(editor.undo().await?))
}

async fn redo<S: MutationSource>(
    State(editor): EditorState<S>,
) -> Result<Json<SchemaView>, EditorError> {
    Ok(Json(editor.redo().await?))
}

async fn apply_actions<S: MutationSource>(
    State(editor): EditorState<S>,
    Json(proposal): Json<MutationProposal>,
) -> Result<Json<BatchReport>, EditorError> {
    Ok(Json(editor.apply_proposal(&proposal).await?))
}

async fn generate<S: MutationSource>(
    State(editor): EditorState<S>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<BatchReport>, EditorError> {
    let report = editor
        .generate(&request.prompt, request.allow_destructive)
        .await?;
    Ok(Json(report))
}

async fn restore_backup<S: MutationSource>(
    State(editor): EditorState<S>,
) -> Result<Json<SchemaView>, EditorError> {
    Ok(Json(editor.load_from_backup().await?))
}
