use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::ScriptingStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Major,
    Quick,
}

/// Which footage types exist for a location, per the project-level inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootageInventoryEntry {
    #[serde(default)]
    pub b_roll: bool,
    #[serde(default)]
    pub on_camera: bool,
    #[serde(default)]
    pub drone: bool,
    pub stop_type: StopType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// A trip/series project. Owns the location list and footage inventory that
/// every video's scripting pass reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub locations: Vec<ProjectLocation>,
    #[serde(default)]
    pub footage_inventory: BTreeMap<String, FootageInventoryEntry>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Project {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            locations: Vec::new(),
            footage_inventory: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCameraInputMode {
    PerLocation,
    Transcript,
}

impl Default for OnCameraInputMode {
    fn default() -> Self {
        OnCameraInputMode::PerLocation
    }
}

/// The scripting task sub-document embedded in a video. Field names here are
/// the persisted document shape; the store round-trips this struct exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptingTaskState {
    #[serde(default)]
    pub scripting_stage: ScriptingStage,
    /// Furthest stage ever reached; gates forward navigation.
    #[serde(default)]
    pub highest_reached_stage: ScriptingStage,
    #[serde(default)]
    pub initial_thoughts: String,
    #[serde(default)]
    pub initial_questions: Vec<String>,
    /// Sparse index -> answer. Indices always refer to the current question
    /// list; removals re-sequence this map in the same operation.
    #[serde(default)]
    pub initial_answers: BTreeMap<usize, String>,
    #[serde(default)]
    pub script_plan: String,
    #[serde(default)]
    pub location_questions: Vec<String>,
    #[serde(default)]
    pub user_experiences: BTreeMap<usize, String>,
    /// Cached projection of on-camera-eligible locations. Recomputed on
    /// workspace open; never authoritative.
    #[serde(default)]
    pub on_camera_locations: Vec<String>,
    #[serde(default)]
    pub on_camera_descriptions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub on_camera_input_mode: OnCameraInputMode,
    #[serde(default)]
    pub full_transcript: String,
    #[serde(default)]
    pub refined_script_plan: String,
    /// Locations excluded from this video's scripting pass only (soft
    /// exclusion); the project inventory is untouched.
    #[serde(default)]
    pub scripting_locations_removed: Vec<String>,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTasks {
    #[serde(default)]
    pub scripting: ScriptingTaskState,
}

/// The unit of work: one planned video within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub concept: String,
    #[serde(default)]
    pub locations_featured: Vec<String>,
    #[serde(default)]
    pub tasks: VideoTasks,
    /// Final voiceover script, mirrored from the scripting task on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl Video {
    pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Video {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            title: title.into(),
            concept: String::new(),
            locations_featured: Vec::new(),
            tasks: VideoTasks::default(),
            script: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Initial,
    Refinement,
}

impl ScriptingTaskState {
    /// Move the stage forward/backward while keeping the high-water mark.
    pub fn set_stage(&mut self, stage: ScriptingStage) {
        self.scripting_stage = stage;
        self.highest_reached_stage = self.highest_reached_stage.max(stage);
    }

    /// Remove a question and re-sequence its sparse answer map in one local
    /// transformation, so no answer index can dangle. Answers above the
    /// removed index shift down by one; the removed index's answer is dropped.
    pub fn remove_question(&mut self, kind: QuestionKind, index: usize) -> bool {
        let (questions, answers) = match kind {
            QuestionKind::Initial => (&mut self.initial_questions, &mut self.initial_answers),
            QuestionKind::Refinement => (&mut self.location_questions, &mut self.user_experiences),
        };
        if index >= questions.len() {
            return false;
        }
        questions.remove(index);
        let old = std::mem::take(answers);
        for (i, answer) in old {
            if i < index {
                answers.insert(i, answer);
            } else if i > index {
                answers.insert(i - 1, answer);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_refinement_questions() -> ScriptingTaskState {
        let mut state = ScriptingTaskState::default();
        state.location_questions = vec![
            "What was the drive like?".to_string(),
            "Any food highlights?".to_string(),
            "Would you go back?".to_string(),
        ];
        state.user_experiences.insert(0, "a".to_string());
        state.user_experiences.insert(1, "b".to_string());
        state.user_experiences.insert(2, "c".to_string());
        state
    }

    #[test]
    fn remove_question_compacts_answer_indices() {
        let mut state = state_with_refinement_questions();
        assert!(state.remove_question(QuestionKind::Refinement, 1));
        assert_eq!(state.location_questions.len(), 2);
        assert_eq!(state.user_experiences.len(), 2);
        assert_eq!(state.user_experiences.get(&0).map(String::as_str), Some("a"));
        assert_eq!(state.user_experiences.get(&1).map(String::as_str), Some("c"));
    }

    #[test]
    fn remove_question_never_leaves_dangling_index() {
        let mut state = state_with_refinement_questions();
        state.remove_question(QuestionKind::Refinement, 0);
        state.remove_question(QuestionKind::Refinement, 0);
        assert_eq!(state.location_questions.len(), 1);
        for index in state.user_experiences.keys() {
            assert!(*index < state.location_questions.len());
        }
    }

    #[test]
    fn remove_question_out_of_range_is_noop() {
        let mut state = state_with_refinement_questions();
        assert!(!state.remove_question(QuestionKind::Refinement, 5));
        assert_eq!(state.location_questions.len(), 3);
        assert_eq!(state.user_experiences.len(), 3);
    }

    #[test]
    fn set_stage_keeps_high_water_mark_when_stepping_back() {
        let mut state = ScriptingTaskState::default();
        state.set_stage(ScriptingStage::RefinementQa);
        state.set_stage(ScriptingStage::InitialQa);
        assert_eq!(state.scripting_stage, ScriptingStage::InitialQa);
        assert_eq!(state.highest_reached_stage, ScriptingStage::RefinementQa);
    }

    #[test]
    fn task_state_round_trips_through_json() {
        let mut state = state_with_refinement_questions();
        state.set_stage(ScriptingStage::OnCameraQa);
        state.initial_thoughts = "We visited three castles".to_string();
        state
            .on_camera_descriptions
            .insert("Eilean Donan".to_string(), vec!["intro line".to_string()]);
        state.scripting_locations_removed.push("Inverness".to_string());
        let json = serde_json::to_value(&state).unwrap();
        let back: ScriptingTaskState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
