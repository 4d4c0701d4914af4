use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use engine::Video;

use crate::api::{store_error, ApiError, AppState};
use crate::store::{video_path, videos_prefix, StoreError};

#[derive(Deserialize)]
pub struct CreateVideoRequest {
    title: String,
    #[serde(default)]
    concept: String,
    #[serde(default)]
    locations_featured: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/:id/videos", get(list_videos))
        .route("/:id/videos", post(create_video))
        .route("/:id/videos/:vid", get(get_video))
        .with_state(state)
}

async fn list_videos(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<Vec<Video>>, ApiError> {
    let docs = state
        .store
        .list(&videos_prefix(&pid))
        .await
        .map_err(store_error)?;
    let videos = docs
        .into_iter()
        .filter_map(|(_, doc)| serde_json::from_value(doc).ok())
        .collect();
    Ok(Json(videos))
}

async fn create_video(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(req): Json<CreateVideoRequest>,
) -> Result<Json<Video>, ApiError> {
    let mut video = Video::new(pid.clone(), req.title);
    video.concept = req.concept;
    video.locations_featured = req.locations_featured;

    let body = serde_json::to_value(&video).map_err(|e| store_error(StoreError::Json(e)))?;
    state
        .store
        .set(&video_path(&pid, &video.id), body)
        .await
        .map_err(store_error)?;
    Ok(Json(video))
}

async fn get_video(
    State(state): State<AppState>,
    Path((pid, vid)): Path<(String, String)>,
) -> Result<Json<Video>, ApiError> {
    let path = video_path(&pid, &vid);
    let doc = state
        .store
        .get(&path)
        .await
        .map_err(store_error)?
        .ok_or_else(|| store_error(StoreError::NotFound(path)))?;
    let video = serde_json::from_value(doc).map_err(|e| store_error(StoreError::Json(e)))?;
    Ok(Json(video))
}
