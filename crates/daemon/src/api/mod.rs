use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Json;
use axum::Router;
use serde::Serialize;

use crate::autosave::AutosaveBuffer;
use crate::store::{DocumentStore, StoreError};
use crate::workflow::{ScriptingWorkflow, WorkflowError};

pub mod drafts;
pub mod projects;
pub mod scripting;
pub mod videos;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub workflow: Arc<ScriptingWorkflow>,
    pub autosave: Arc<AutosaveBuffer>,
}

/// Error body carries a machine-readable kind so the UI can tell a
/// retryable network failure from "the AI answered wrong" from bad input.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn workflow_error(err: WorkflowError) -> ApiError {
    let (status, kind) = match &err {
        WorkflowError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        WorkflowError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport"),
        WorkflowError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
        WorkflowError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        WorkflowError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence"),
        WorkflowError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        WorkflowError::Busy(_) => (StatusCode::CONFLICT, "busy"),
        WorkflowError::Stale => (StatusCode::CONFLICT, "stale"),
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            kind,
        }),
    )
}

pub fn store_error(err: StoreError) -> ApiError {
    match &err {
        StoreError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: err.to_string(),
                kind: "not_found",
            }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: err.to_string(),
                kind: "persistence",
            }),
        ),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/projects", {
            Router::new()
                .merge(projects::router(state.clone()))
                .merge(videos::router(state.clone()))
                .merge(scripting::router(state.clone()))
        })
        .nest("/drafts", drafts::router(state))
}
