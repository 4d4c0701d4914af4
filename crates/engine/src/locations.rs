//! Location/footage reconciliation: the single source for deriving which
//! locations are eligible for on-camera scripting in one video.

use std::collections::BTreeMap;

use crate::model::{FootageInventoryEntry, ScriptingTaskState, Video};

/// Filter the video's featured locations down to those with on-camera
/// footage in the project inventory, minus soft exclusions. Pure and
/// idempotent; callers treat the result as a projection, never as truth.
pub fn derive_on_camera_locations(
    featured: &[String],
    inventory: &BTreeMap<String, FootageInventoryEntry>,
    soft_excluded: &[String],
) -> Vec<String> {
    featured
        .iter()
        .filter(|name| {
            inventory
                .get(name.as_str())
                .map(|entry| entry.on_camera)
                .unwrap_or(false)
        })
        .filter(|name| !soft_excluded.contains(name))
        .cloned()
        .collect()
}

/// Recompute and cache the projection on the task state.
pub fn refresh_on_camera_projection(
    state: &mut ScriptingTaskState,
    featured: &[String],
    inventory: &BTreeMap<String, FootageInventoryEntry>,
) {
    state.on_camera_locations =
        derive_on_camera_locations(featured, inventory, &state.scripting_locations_removed);
}

/// Soft-exclude a location from this video's scripting pass. Idempotent:
/// excluding an already-excluded name changes nothing.
pub fn soft_exclude(state: &mut ScriptingTaskState, name: &str) {
    if !state
        .scripting_locations_removed
        .iter()
        .any(|n| n == name)
    {
        state.scripting_locations_removed.push(name.to_string());
    }
    state
        .on_camera_locations
        .retain(|n| n != name);
}

/// Strip a location from this video's featured list. The project-level
/// cleanup (only when no sibling video still references it) is the caller's
/// job; this handles the per-video side only.
pub fn remove_featured_location(video: &mut Video, name: &str) -> bool {
    let before = video.locations_featured.len();
    video.locations_featured.retain(|n| n != name);
    let scripting = &mut video.tasks.scripting;
    scripting.on_camera_locations.retain(|n| n != name);
    scripting.scripting_locations_removed.retain(|n| n != name);
    scripting.on_camera_descriptions.remove(name);
    video.locations_featured.len() != before
}

/// Re-add a location to the featured list. A prior soft exclusion is
/// auto-cleared so the location becomes eligible again.
pub fn add_featured_location(video: &mut Video, name: &str) {
    if !video.locations_featured.iter().any(|n| n == name) {
        video.locations_featured.push(name.to_string());
    }
    video
        .tasks
        .scripting
        .scripting_locations_removed
        .retain(|n| n != name);
}
