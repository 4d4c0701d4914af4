//! Scripting workflow endpoints: one POST per stage transition, plus
//! answer/question edits, location removal, and the debounced workspace
//! autosave. Stage-transition handlers return the updated task state; the
//! UI re-renders from it and from store subscriptions.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use engine::{QuestionKind, ScriptingTaskState, Video};

use crate::api::{workflow_error, ApiError, AppState};
use crate::store::video_path;
use crate::workflow::RemovalMode;

#[derive(Deserialize)]
pub struct InstructionsRequest {
    instructions: String,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    kind: QuestionKind,
    index: usize,
    answer: String,
}

#[derive(Deserialize)]
pub struct RemoveQuestionRequest {
    kind: QuestionKind,
    index: usize,
}

#[derive(Deserialize)]
pub struct RemoveLocationRequest {
    name: String,
    mode: RemovalMode,
}

#[derive(Deserialize)]
pub struct AddLocationRequest {
    name: String,
}

#[derive(Serialize)]
pub struct StagedResponse {
    staged: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/:id/videos/:vid/scripting", get(open_workspace))
        .route("/:id/videos/:vid/scripting", patch(stage_edit))
        .route("/:id/videos/:vid/scripting/flush", post(flush_edits))
        .route("/:id/videos/:vid/scripting/clarify-vision", post(clarify_vision))
        .route("/:id/videos/:vid/scripting/draft-outline", post(draft_outline))
        .route("/:id/videos/:vid/scripting/refine-outline", post(refine_outline))
        .route(
            "/:id/videos/:vid/scripting/refinement-questions",
            post(refinement_questions),
        )
        .route(
            "/:id/videos/:vid/scripting/proceed-on-camera",
            post(proceed_on_camera),
        )
        .route("/:id/videos/:vid/scripting/parse-transcript", post(parse_transcript))
        .route("/:id/videos/:vid/scripting/refined-plan", post(refined_plan))
        .route("/:id/videos/:vid/scripting/full-script", post(full_script))
        .route("/:id/videos/:vid/scripting/refine-script", post(refine_script))
        .route("/:id/videos/:vid/scripting/complete", post(complete))
        .route("/:id/videos/:vid/scripting/reopen", post(reopen))
        .route("/:id/videos/:vid/scripting/answers", post(record_answer))
        .route(
            "/:id/videos/:vid/scripting/questions/remove",
            post(remove_question),
        )
        .route(
            "/:id/videos/:vid/scripting/locations/remove",
            post(remove_location),
        )
        .route("/:id/videos/:vid/scripting/locations/add", post(add_location))
        .with_state(state)
}

/// Open/resume the workspace: the persisted task plus a freshly derived
/// on-camera projection, so re-entry matches where the user left off.
async fn open_workspace(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<Video>, ApiError> {
    state
        .workflow
        .open_workspace(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

/// Debounced autosave of free-text workspace fields. Nothing hits the
/// store until the quiet window elapses or the workspace flushes on close.
/// Unknown keys and edits to a completed task are refused up front.
async fn stage_edit(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Json<StagedResponse>, ApiError> {
    let payload = state
        .workflow
        .prepare_workspace_edit(&pid, &vid, fields)
        .await
        .map_err(workflow_error)?;
    state.autosave.stage(&video_path(&pid, &vid), payload);
    Ok(Json(StagedResponse { staged: true }))
}

/// Explicit close: force the pending edits out before the workspace goes
/// away.
async fn flush_edits(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<StagedResponse>, ApiError> {
    state
        .autosave
        .flush_now(&video_path(&pid, &vid))
        .await
        .map_err(crate::api::store_error)?;
    Ok(Json(StagedResponse { staged: false }))
}

async fn clarify_vision(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .clarify_vision(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn draft_outline(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .generate_draft_outline(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn refine_outline(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<InstructionsRequest>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .refine_outline(&pid, &vid, &req.instructions)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn refinement_questions(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .generate_refinement_questions(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn proceed_on_camera(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .proceed_to_on_camera(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn parse_transcript(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .parse_transcript(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn refined_plan(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .generate_refined_plan(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn full_script(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .generate_full_script(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn refine_script(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<InstructionsRequest>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .refine_script(&pid, &vid, &req.instructions)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn complete(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    // Make sure nothing typed in the final review is lost before the
    // terminal write.
    state
        .autosave
        .flush_now(&video_path(&pid, &vid))
        .await
        .map_err(crate::api::store_error)?;
    state
        .workflow
        .save_and_complete(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn reopen(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .reopen(&pid, &vid)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn record_answer(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .record_answer(&pid, &vid, req.kind, req.index, &req.answer)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn remove_question(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<RemoveQuestionRequest>,
) -> Result<Json<ScriptingTaskState>, ApiError> {
    state
        .workflow
        .remove_question(&pid, &vid, req.kind, req.index)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn remove_location(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<RemoveLocationRequest>,
) -> Result<Json<Video>, ApiError> {
    state
        .workflow
        .remove_location(&pid, &vid, &req.name, req.mode)
        .await
        .map(Json)
        .map_err(workflow_error)
}

async fn add_location(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
    Json(req): Json<AddLocationRequest>,
) -> Result<Json<Video>, ApiError> {
    state
        .workflow
        .add_location_to_video(&pid, &vid, &req.name)
        .await
        .map(Json)
        .map_err(workflow_error)
}
