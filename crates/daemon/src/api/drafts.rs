//! Draft endpoints: wizard state autosaves here until the user either
//! abandons the draft or promotes it into a real entity.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{store_error, ApiError, AppState};
use crate::store::{draft_path, StoreError};

#[derive(Deserialize)]
pub struct PromoteRequest {
    target_path: String,
}

#[derive(Serialize)]
pub struct CreatedDraft {
    id: String,
}

#[derive(Serialize)]
pub struct StagedResponse {
    staged: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_draft))
        .route("/:id", get(get_draft))
        .route("/:id", patch(stage_draft))
        .route("/:id", delete(delete_draft))
        .route("/:id/flush", post(flush_draft))
        .route("/:id/promote", post(promote_draft))
        .with_state(state)
}

/// Mint a draft id and seed the document with the wizard's opening fields,
/// so edits have somewhere to autosave from the first keystroke.
async fn create_draft(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CreatedDraft>, ApiError> {
    let id = Uuid::new_v4().to_string();
    state
        .store
        .set(&draft_path(&id), body)
        .await
        .map_err(store_error)?;
    Ok(Json(CreatedDraft { id }))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // Flush first so a resume sees its own freshest edits.
    state
        .autosave
        .flush_now(&draft_path(&id))
        .await
        .map_err(store_error)?;
    let doc = state
        .store
        .get(&draft_path(&id))
        .await
        .map_err(store_error)?
        .ok_or_else(|| store_error(StoreError::NotFound(draft_path(&id))))?;
    Ok(Json(doc))
}

async fn stage_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Value>,
) -> Result<Json<StagedResponse>, ApiError> {
    state.autosave.stage(&draft_path(&id), fields);
    Ok(Json(StagedResponse { staged: true }))
}

async fn flush_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StagedResponse>, ApiError> {
    state
        .autosave
        .flush_now(&draft_path(&id))
        .await
        .map_err(store_error)?;
    Ok(Json(StagedResponse { staged: false }))
}

/// Abandon. Works from a list view; the draft does not need to be open.
async fn delete_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .autosave
        .delete_draft(&id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn promote_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PromoteRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .autosave
        .promote_draft(&id, &req.target_path)
        .await
        .map(Json)
        .map_err(store_error)
}
