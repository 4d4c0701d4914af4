//! Destructive and non-destructive location removal for a video's
//! scripting pass, plus featured-list edits. The destructive path owns the
//! sibling-video scan that protects shared project footage data.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use engine::locations::{
    add_featured_location, remove_featured_location, soft_exclude,
};
use engine::Video;

use crate::store::{project_path, replace_patch, video_path, videos_prefix, WriteOp};
use crate::workflow::{ScriptingWorkflow, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode {
    /// Exclude from this video's scripting pass only; the project inventory
    /// and sibling videos are untouched.
    ScriptOnly,
    /// Strip from this video permanently, and purge from the project only
    /// when no sibling video still references the location.
    VideoRemove,
}

impl ScriptingWorkflow {
    pub async fn remove_location(
        &self,
        project_id: &str,
        video_id: &str,
        name: &str,
        mode: RemovalMode,
    ) -> Result<Video, WorkflowError> {
        match mode {
            RemovalMode::ScriptOnly => self.remove_location_script_only(project_id, video_id, name).await,
            RemovalMode::VideoRemove => self.remove_location_from_video(project_id, video_id, name).await,
        }
    }

    async fn remove_location_script_only(
        &self,
        project_id: &str,
        video_id: &str,
        name: &str,
    ) -> Result<Video, WorkflowError> {
        let mut video = self.ensure_editable(project_id, video_id).await?;
        soft_exclude(&mut video.tasks.scripting, name);
        self.store
            .update(
                &video_path(project_id, video_id),
                json!({"tasks": {"scripting": {
                    "scripting_locations_removed": video.tasks.scripting.scripting_locations_removed,
                    "on_camera_locations": video.tasks.scripting.on_camera_locations,
                }}}),
            )
            .await?;
        Ok(video)
    }

    async fn remove_location_from_video(
        &self,
        project_id: &str,
        video_id: &str,
        name: &str,
    ) -> Result<Video, WorkflowError> {
        let mut video = self.ensure_editable(project_id, video_id).await?;
        let descriptions_before = video.tasks.scripting.on_camera_descriptions.clone();
        if !remove_featured_location(&mut video, name) {
            return Err(WorkflowError::Validation(format!(
                "location {:?} is not featured in this video",
                name
            )));
        }

        // The description map shrinks here; a plain merge would keep the
        // removed location's dialogue in the stored document.
        let descriptions = {
            let old = serde_json::to_value(&descriptions_before)
                .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
            let new = serde_json::to_value(&video.tasks.scripting.on_camera_descriptions)
                .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
            replace_patch(&old, &new)
        };
        let mut ops = vec![WriteOp::Update {
            path: video_path(project_id, video_id),
            fields: json!({
                "locations_featured": video.locations_featured,
                "tasks": {"scripting": {
                    "on_camera_locations": video.tasks.scripting.on_camera_locations,
                    "scripting_locations_removed": video.tasks.scripting.scripting_locations_removed,
                    "on_camera_descriptions": descriptions,
                }},
            }),
        }];

        // Scan every sibling video before touching shared project state:
        // the footage inventory entry stays as long as anyone references it.
        let still_referenced = self
            .store
            .list(&videos_prefix(project_id))
            .await?
            .into_iter()
            .filter(|(path, _)| path != &video_path(project_id, video_id))
            .any(|(_, doc)| {
                doc.get("locations_featured")
                    .and_then(|v| v.as_array())
                    .map(|list| list.iter().any(|v| v.as_str() == Some(name)))
                    .unwrap_or(false)
            });

        if !still_referenced {
            let mut project = self.load_project(project_id).await?;
            project.locations.retain(|l| l.name != name);
            project.footage_inventory.remove(name);
            // A merge update cannot drop a map key, so the purge replaces
            // the whole project document.
            let body = serde_json::to_value(&project)
                .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
            ops.push(WriteOp::Set {
                path: project_path(project_id),
                body,
            });
            info!(project_id, name, "purged location from project inventory");
        } else {
            info!(
                project_id,
                name, "location still referenced by a sibling video; inventory kept"
            );
        }

        self.store.batch_write(ops).await?;
        Ok(video)
    }

    /// Re-adding a location clears any prior soft exclusion, so it becomes
    /// eligible for on-camera scripting again.
    pub async fn add_location_to_video(
        &self,
        project_id: &str,
        video_id: &str,
        name: &str,
    ) -> Result<Video, WorkflowError> {
        let mut video = self.ensure_editable(project_id, video_id).await?;
        add_featured_location(&mut video, name);
        self.store
            .update(
                &video_path(project_id, video_id),
                json!({
                    "locations_featured": video.locations_featured,
                    "tasks": {"scripting": {
                        "scripting_locations_removed":
                            video.tasks.scripting.scripting_locations_removed,
                    }},
                }),
            )
            .await?;
        Ok(video)
    }
}
