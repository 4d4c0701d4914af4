use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use engine::{FootageInventoryEntry, Project, ProjectLocation};

use crate::api::{store_error, ApiError, AppState};
use crate::store::project_path;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    name: String,
}

#[derive(Deserialize)]
pub struct AddLocationRequest {
    name: String,
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
    footage: FootageInventoryEntry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_projects))
        .route("/", post(create_project))
        .route("/:id", get(get_project))
        .route("/:id", delete(delete_project))
        .route("/:id/locations", post(add_location))
        .with_state(state)
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    let docs = state.store.list("projects/").await.map_err(store_error)?;
    let projects = docs
        .into_iter()
        .filter(|(path, _)| !path.contains("/videos/"))
        .filter_map(|(_, doc)| serde_json::from_value(doc).ok())
        .collect();
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let project = Project::new(req.name);
    let body = serde_json::to_value(&project).map_err(|e| {
        store_error(crate::store::StoreError::Json(e))
    })?;
    state
        .store
        .set(&project_path(&project.id), body)
        .await
        .map_err(store_error)?;
    Ok(Json(project))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let doc = state
        .store
        .get(&project_path(&id))
        .await
        .map_err(store_error)?
        .ok_or_else(|| store_error(crate::store::StoreError::NotFound(project_path(&id))))?;
    let project =
        serde_json::from_value(doc).map_err(|e| store_error(crate::store::StoreError::Json(e)))?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    // Videos live under the project path prefix; drop them with it.
    let docs = state
        .store
        .list(&project_path(&id))
        .await
        .map_err(store_error)?;
    for (path, _) in docs {
        state.store.delete(&path).await.map_err(store_error)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddLocationRequest>,
) -> Result<Json<Project>, ApiError> {
    let doc = state
        .store
        .get(&project_path(&id))
        .await
        .map_err(store_error)?
        .ok_or_else(|| store_error(crate::store::StoreError::NotFound(project_path(&id))))?;
    let mut project: Project =
        serde_json::from_value(doc).map_err(|e| store_error(crate::store::StoreError::Json(e)))?;

    if !project.locations.iter().any(|l| l.name == req.name) {
        project.locations.push(ProjectLocation {
            name: req.name.clone(),
            place_id: req.place_id,
            lat: req.lat,
            lng: req.lng,
        });
    }
    project.footage_inventory.insert(req.name, req.footage);

    state
        .store
        .update(
            &project_path(&id),
            json!({
                "locations": project.locations,
                "footage_inventory": project.footage_inventory,
            }),
        )
        .await
        .map_err(store_error)?;
    Ok(Json(project))
}
