//! Stage transitions: one typed operation per stage-advance action. Each
//! transition validates its inputs, validates the shape of the AI output,
//! and returns a [`StageWrite`] naming exactly the fields to persist. A
//! failed validation returns an error and nothing is written, so the prior
//! committed state stays authoritative and every retry is safe.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::locations::refresh_on_camera_projection;
use crate::model::{FootageInventoryEntry, ScriptingTaskState};
use crate::stage::ScriptingStage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("scripting task is already complete; reopen it to make changes")]
    TaskComplete,
    #[error("required input `{0}` is empty")]
    EmptyInput(&'static str),
    #[error("AI response is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("AI response field `{field}` is not {expected}")]
    WrongShape {
        field: &'static str,
        expected: &'static str,
    },
}

/// The outcome of a successful transition: the updated task state plus the
/// names of the persisted-document fields this transition is allowed to
/// write. Fields outside the list must not be touched by the caller, which
/// is what keeps unrelated in-progress data intact across stage commits.
#[derive(Debug, Clone)]
pub struct StageWrite {
    pub state: ScriptingTaskState,
    pub fields: &'static [&'static str],
    /// Set by save-and-complete: the final script is mirrored onto the
    /// owning video document.
    pub mirror_script_to_video: bool,
}

impl StageWrite {
    fn new(state: ScriptingTaskState, fields: &'static [&'static str]) -> Self {
        StageWrite {
            state,
            fields,
            mirror_script_to_video: false,
        }
    }
}

fn ensure_open(state: &ScriptingTaskState) -> Result<(), TransitionError> {
    if state.complete {
        return Err(TransitionError::TaskComplete);
    }
    Ok(())
}

fn require_text(value: &str, name: &'static str) -> Result<(), TransitionError> {
    if value.trim().is_empty() {
        return Err(TransitionError::EmptyInput(name));
    }
    Ok(())
}

fn string_list(output: &Value, field: &'static str) -> Result<Vec<String>, TransitionError> {
    let raw = output.get(field).ok_or(TransitionError::MissingField(field))?;
    let items = raw.as_array().ok_or(TransitionError::WrongShape {
        field,
        expected: "a non-empty array of strings",
    })?;
    let list: Option<Vec<String>> = items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect();
    match list {
        Some(list) if !list.is_empty() => Ok(list),
        _ => Err(TransitionError::WrongShape {
            field,
            expected: "a non-empty array of strings",
        }),
    }
}

fn text_field(output: &Value, field: &'static str) -> Result<String, TransitionError> {
    let raw = output.get(field).ok_or(TransitionError::MissingField(field))?;
    match raw.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(TransitionError::WrongShape {
            field,
            expected: "a non-empty string",
        }),
    }
}

/// Clarify vision: initial brain-dump -> clarifying questions.
pub fn clarify_vision(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.initial_thoughts, "initial_thoughts")?;
    let questions = string_list(ai_output, "questions")?;

    let mut next = state.clone();
    next.initial_questions = questions;
    next.initial_answers = BTreeMap::new();
    next.set_stage(ScriptingStage::InitialQa);
    Ok(StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "initial_questions",
            "initial_answers",
        ],
    ))
}

/// Generate the first draft outline from thoughts plus clarifying answers.
pub fn generate_draft_outline(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.initial_thoughts, "initial_thoughts")?;
    let outline = text_field(ai_output, "draftOutline")?;

    let mut next = state.clone();
    next.script_plan = outline;
    next.set_stage(ScriptingStage::DraftOutlineReview);
    Ok(StageWrite::new(
        next,
        &["scripting_stage", "highest_reached_stage", "script_plan"],
    ))
}

/// Rework the outline per user instructions. Stage does not move.
pub fn refine_outline(
    state: &ScriptingTaskState,
    instructions: &str,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.script_plan, "script_plan")?;
    require_text(instructions, "refinement_instructions")?;
    let outline = text_field(ai_output, "draftOutline")?;

    let mut next = state.clone();
    next.script_plan = outline;
    Ok(StageWrite::new(next, &["script_plan"]))
}

/// Produce the location/experience refinement questions for the outline.
pub fn generate_refinement_questions(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.script_plan, "script_plan")?;
    let questions = string_list(ai_output, "locationQuestions")?;

    let mut next = state.clone();
    next.location_questions = questions;
    next.user_experiences = BTreeMap::new();
    next.set_stage(ScriptingStage::RefinementQa);
    Ok(StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "location_questions",
            "user_experiences",
        ],
    ))
}

/// Move into on-camera capture. Pure local derivation: the eligible-location
/// projection is recomputed from current project inventory, no AI call.
pub fn proceed_to_on_camera(
    state: &ScriptingTaskState,
    featured: &[String],
    inventory: &BTreeMap<String, FootageInventoryEntry>,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    if state.user_experiences.is_empty() {
        return Err(TransitionError::EmptyInput("user_experiences"));
    }
    let mut next = state.clone();
    refresh_on_camera_projection(&mut next, featured, inventory);
    next.set_stage(ScriptingStage::OnCameraQa);
    Ok(StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "on_camera_locations",
        ],
    ))
}

/// Split a pasted transcript into per-location dialogue lines. Unknown
/// location keys in the AI output are dropped; only locations in the current
/// projection are kept.
pub fn parse_transcript(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.full_transcript, "full_transcript")?;
    if state.on_camera_locations.is_empty() {
        return Err(TransitionError::EmptyInput("on_camera_locations"));
    }
    let map = ai_output.as_object().ok_or(TransitionError::WrongShape {
        field: "transcript map",
        expected: "an object mapping location names to dialogue lines",
    })?;

    let mut descriptions = BTreeMap::new();
    for (name, lines) in map {
        if !state.on_camera_locations.contains(name) {
            continue;
        }
        let lines = match lines {
            Value::String(text) => vec![text.clone()],
            Value::Array(items) => {
                let collected: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                collected.ok_or(TransitionError::WrongShape {
                    field: "transcript map",
                    expected: "dialogue lines as strings",
                })?
            }
            _ => {
                return Err(TransitionError::WrongShape {
                    field: "transcript map",
                    expected: "dialogue lines as a string or array of strings",
                })
            }
        };
        descriptions.insert(name.clone(), lines);
    }
    if descriptions.is_empty() {
        return Err(TransitionError::WrongShape {
            field: "transcript map",
            expected: "at least one entry for a known on-camera location",
        });
    }

    let mut next = state.clone();
    next.on_camera_descriptions = descriptions;
    next.set_stage(ScriptingStage::ReviewParsedTranscript);
    Ok(StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "on_camera_descriptions",
        ],
    ))
}

/// Merge on-camera notes into the outline to produce the refined plan.
pub fn generate_refined_plan(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.script_plan, "script_plan")?;
    if state.on_camera_descriptions.is_empty() {
        return Err(TransitionError::EmptyInput("on_camera_descriptions"));
    }
    let plan = text_field(ai_output, "refinedScriptPlan")?;

    let mut next = state.clone();
    next.refined_script_plan = plan;
    next.set_stage(ScriptingStage::RefinedPlanReview);
    Ok(StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "refined_script_plan",
        ],
    ))
}

/// Generate the full voiceover script. Runs off the refined plan, or
/// directly off the outline when the video has no on-camera locations.
pub fn generate_full_script(
    state: &ScriptingTaskState,
    ai_output: &Value,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    if state.refined_script_plan.trim().is_empty() {
        if state.on_camera_locations.is_empty() {
            require_text(&state.script_plan, "script_plan")?;
        } else {
            return Err(TransitionError::EmptyInput("refined_script_plan"));
        }
    }
    let script = text_field(ai_output, "finalScript")?;

    let mut next = state.clone();
    next.script = script;
    next.set_stage(ScriptingStage::FullScriptReview);
    Ok(StageWrite::new(
        next,
        &["scripting_stage", "highest_reached_stage", "script"],
    ))
}

/// Rewrite the script per user instructions. The AI replies in plain text
/// here, not structured JSON. Stage does not move.
pub fn refine_script(
    state: &ScriptingTaskState,
    instructions: &str,
    rewritten: &str,
) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.script, "script")?;
    require_text(instructions, "refinement_instructions")?;
    if rewritten.trim().is_empty() {
        return Err(TransitionError::WrongShape {
            field: "script",
            expected: "a non-empty rewritten script",
        });
    }

    let mut next = state.clone();
    next.script = rewritten.to_string();
    Ok(StageWrite::new(next, &["script"]))
}

/// Explicit save-and-complete from full-script review. The only way into
/// the terminal stage.
pub fn save_and_complete(state: &ScriptingTaskState) -> Result<StageWrite, TransitionError> {
    ensure_open(state)?;
    require_text(&state.script, "script")?;

    let mut next = state.clone();
    next.complete = true;
    next.set_stage(ScriptingStage::Complete);
    let mut write = StageWrite::new(
        next,
        &[
            "scripting_stage",
            "highest_reached_stage",
            "complete",
            "script",
        ],
    );
    write.mirror_script_to_video = true;
    Ok(write)
}

/// Explicit revisit of a completed task. The only way out of the terminal
/// stage; without it, edits while complete never persist.
pub fn reopen(state: &ScriptingTaskState) -> Result<StageWrite, TransitionError> {
    if !state.complete {
        return Err(TransitionError::EmptyInput("complete"));
    }
    let mut next = state.clone();
    next.complete = false;
    next.scripting_stage = ScriptingStage::FullScriptReview;
    Ok(StageWrite::new(
        next,
        &["scripting_stage", "complete"],
    ))
}
