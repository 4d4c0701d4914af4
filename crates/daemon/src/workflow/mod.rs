//! Stage transition orchestrator: one method per stage-advance action.
//! Each method reads the persisted video document, checks preconditions,
//! assembles the stage prompt, calls the generative client, validates the
//! result through the engine's typed transition, and commits the stage's
//! field group plus the next stage name in one partial update. Any failure
//! leaves the prior committed state authoritative.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use engine::transition::{self, StageWrite, TransitionError};
use engine::{QuestionKind, ScriptingStage, ScriptingTaskState, Video};

use crate::llm::{
    GenerateRequest, GenerativeClient, LlmError, ModelTier, ResponseFormat,
};
use crate::store::{video_path, DocumentStore, StoreError};

pub mod locations;
pub mod prompts;

pub use locations::RemovalMode;

/// Fields the workspace may stage through autosave. Everything else in the
/// task document is owned by stage transitions.
const EDITABLE_FIELDS: [&str; 9] = [
    "initial_thoughts",
    "initial_answers",
    "script_plan",
    "user_experiences",
    "on_camera_descriptions",
    "on_camera_input_mode",
    "full_transcript",
    "refined_script_plan",
    "script",
];

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// User input missing or invalid; nothing was sent to the AI and
    /// nothing was persisted.
    #[error("{0}")]
    Validation(String),
    #[error("network failure talking to the generative service: {0}")]
    Transport(String),
    #[error("the AI answered in an unexpected shape: {0}")]
    MalformedResponse(String),
    #[error("the AI call timed out after {0} seconds")]
    Timeout(u64),
    /// The AI responded fine but the store write failed; the caller should
    /// retry the save, not regenerate.
    #[error("saving generated content failed: {0}")]
    Persistence(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("a {0} request is already in flight for this video")]
    Busy(&'static str),
    /// The task moved on while the call was outstanding; the result was
    /// discarded rather than written over newer state.
    #[error("task state changed while generating; the result was discarded")]
    Stale,
}

impl From<LlmError> for WorkflowError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(secs) => WorkflowError::Timeout(secs),
            LlmError::Transport(msg) => WorkflowError::Transport(msg),
            LlmError::Status { status, message } => {
                WorkflowError::Transport(format!("HTTP {}: {}", status, message))
            }
            LlmError::MalformedResponse(msg) => WorkflowError::MalformedResponse(msg),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::TaskComplete | TransitionError::EmptyInput(_) => {
                WorkflowError::Validation(err.to_string())
            }
            TransitionError::MissingField(_) | TransitionError::WrongShape { .. } => {
                WorkflowError::MalformedResponse(err.to_string())
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => WorkflowError::NotFound(path),
            other => WorkflowError::Persistence(other.to_string()),
        }
    }
}

/// Releases the per-video, per-action in-flight slot on drop, so the slot
/// frees on every exit path including errors.
struct InFlightGuard {
    slots: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slots.lock().unwrap().remove(&self.key);
    }
}

pub struct ScriptingWorkflow {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn GenerativeClient>,
    knowledge_base: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ScriptingWorkflow {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn GenerativeClient>,
        knowledge_base: String,
    ) -> Self {
        ScriptingWorkflow {
            store,
            client,
            knowledge_base,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mirrors the disabled-button semantics: at most one outstanding call
    /// per video per action. Different videos stay independent.
    fn acquire(
        &self,
        video_id: &str,
        action: &'static str,
    ) -> Result<InFlightGuard, WorkflowError> {
        let key = format!("{}:{}", video_id, action);
        let mut slots = self.in_flight.lock().unwrap();
        if !slots.insert(key.clone()) {
            return Err(WorkflowError::Busy(action));
        }
        Ok(InFlightGuard {
            slots: self.in_flight.clone(),
            key,
        })
    }

    pub async fn load_video(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<Video, WorkflowError> {
        let path = video_path(project_id, video_id);
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or(WorkflowError::NotFound(path.clone()))?;
        serde_json::from_value(doc)
            .map_err(|e| WorkflowError::Persistence(format!("corrupt video document {}: {}", path, e)))
    }

    pub async fn load_project(
        &self,
        project_id: &str,
    ) -> Result<engine::Project, WorkflowError> {
        let path = crate::store::project_path(project_id);
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or(WorkflowError::NotFound(path.clone()))?;
        serde_json::from_value(doc).map_err(|e| {
            WorkflowError::Persistence(format!("corrupt project document {}: {}", path, e))
        })
    }

    /// Fail early, before any AI call, when the task is closed for edits.
    pub async fn ensure_editable(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<Video, WorkflowError> {
        let video = self.load_video(project_id, video_id).await?;
        if video.tasks.scripting.complete {
            return Err(WorkflowError::Validation(
                "scripting task is complete; reopen it to make changes".to_string(),
            ));
        }
        Ok(video)
    }

    /// Persist a validated stage write. Re-reads the document first: when
    /// the stage moved or the task completed while the call was out, the
    /// result is dropped instead of overwriting newer state.
    async fn commit(
        &self,
        project_id: &str,
        video_id: &str,
        loaded: (ScriptingStage, bool),
        write: StageWrite,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let current = self.load_video(project_id, video_id).await?;
        let task = &current.tasks.scripting;
        if task.scripting_stage != loaded.0 || task.complete != loaded.1 {
            warn!(
                video_id,
                "discarding stage write: task moved from {:?} during the call",
                loaded.0
            );
            return Err(WorkflowError::Stale);
        }

        let state_value = serde_json::to_value(&write.state)
            .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
        let old_value = serde_json::to_value(task)
            .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
        let mut task_fields = serde_json::Map::new();
        for field in write.fields {
            if let Some(value) = state_value.get(*field) {
                // Replacement, not merge: a transition that clears or
                // shrinks a map-valued field must win over stale entries.
                let patch = match old_value.get(*field) {
                    Some(old) => crate::store::replace_patch(old, value),
                    None => value.clone(),
                };
                task_fields.insert(field.to_string(), patch);
            }
        }
        let mut doc = json!({"tasks": {"scripting": Value::Object(task_fields)}});
        if write.mirror_script_to_video {
            doc["script"] = json!(write.state.script);
        }

        self.store
            .update(&video_path(project_id, video_id), doc)
            .await
            .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
        info!(
            video_id,
            stage = ?write.state.scripting_stage,
            "committed stage write"
        );
        Ok(write.state)
    }

    async fn generate_structured(
        &self,
        prompt: String,
        tier: ModelTier,
    ) -> Result<Value, WorkflowError> {
        let output = self
            .client
            .generate(GenerateRequest {
                prompt,
                response_format: ResponseFormat::StructuredJson,
                model_tier: tier,
            })
            .await?;
        Ok(output.into_structured()?)
    }

    // --- AI-backed transitions -------------------------------------------

    pub async fn clarify_vision(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "clarify_vision")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.initial_thoughts.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "write down your initial thoughts first".to_string(),
            ));
        }

        let prompt = prompts::clarify_vision(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Fast).await?;
        let write = transition::clarify_vision(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn generate_draft_outline(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "generate_draft_outline")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.initial_thoughts.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "write down your initial thoughts first".to_string(),
            ));
        }

        let prompt = prompts::generate_draft_outline(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Capable).await?;
        let write = transition::generate_draft_outline(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn refine_outline(
        &self,
        project_id: &str,
        video_id: &str,
        instructions: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "refine_outline")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if instructions.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "describe the changes you want to the outline".to_string(),
            ));
        }
        if task.script_plan.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "there is no outline to refine yet".to_string(),
            ));
        }

        let prompt = prompts::refine_outline(&self.knowledge_base, task, instructions);
        let output = self.generate_structured(prompt, ModelTier::Capable).await?;
        let write = transition::refine_outline(task, instructions, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn generate_refinement_questions(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "generate_refinement_questions")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.script_plan.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "generate the draft outline first".to_string(),
            ));
        }

        let prompt = prompts::generate_refinement_questions(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Fast).await?;
        let write = transition::generate_refinement_questions(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    /// Pure local transition: no AI call, just the projection recompute.
    pub async fn proceed_to_on_camera(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let video = self.ensure_editable(project_id, video_id).await?;
        let project = self.load_project(project_id).await?;
        let task = &video.tasks.scripting;
        let write = transition::proceed_to_on_camera(
            task,
            &video.locations_featured,
            &project.footage_inventory,
        )?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn parse_transcript(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "parse_transcript")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.full_transcript.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "paste the on-camera transcript first".to_string(),
            ));
        }
        if task.on_camera_locations.is_empty() {
            return Err(WorkflowError::Validation(
                "no on-camera locations to attribute the transcript to".to_string(),
            ));
        }

        let prompt = prompts::parse_transcript(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Fast).await?;
        let write = transition::parse_transcript(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn generate_refined_plan(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "generate_refined_plan")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.on_camera_descriptions.is_empty() {
            return Err(WorkflowError::Validation(
                "capture or parse on-camera notes first".to_string(),
            ));
        }

        let prompt = prompts::generate_refined_plan(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Capable).await?;
        let write = transition::generate_refined_plan(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn generate_full_script(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "generate_full_script")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if task.refined_script_plan.trim().is_empty()
            && !(task.on_camera_locations.is_empty() && !task.script_plan.trim().is_empty())
        {
            return Err(WorkflowError::Validation(
                "generate the refined plan before the full script".to_string(),
            ));
        }

        let prompt = prompts::generate_full_script(&self.knowledge_base, task);
        let output = self.generate_structured(prompt, ModelTier::Capable).await?;
        let write = transition::generate_full_script(task, &output)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn refine_script(
        &self,
        project_id: &str,
        video_id: &str,
        instructions: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let _guard = self.acquire(video_id, "refine_script")?;
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if instructions.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "describe the changes you want to the script".to_string(),
            ));
        }
        if task.script.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "there is no script to refine yet".to_string(),
            ));
        }

        // This transition replies in plain text: the whole rewritten script.
        let prompt = prompts::refine_script(&self.knowledge_base, task, instructions);
        let output = self
            .client
            .generate(GenerateRequest {
                prompt,
                response_format: ResponseFormat::PlainText,
                model_tier: ModelTier::Capable,
            })
            .await?;
        let rewritten = output.into_text()?;
        let write = transition::refine_script(task, instructions, &rewritten)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    // --- local operations ------------------------------------------------

    pub async fn save_and_complete(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let video = self.ensure_editable(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        let write = transition::save_and_complete(task)?;
        self.commit(project_id, video_id, (task.scripting_stage, false), write)
            .await
    }

    pub async fn reopen(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let video = self.load_video(project_id, video_id).await?;
        let task = &video.tasks.scripting;
        if !task.complete {
            return Err(WorkflowError::Validation(
                "scripting task is not complete".to_string(),
            ));
        }
        let write = transition::reopen(task)?;
        self.commit(project_id, video_id, (task.scripting_stage, true), write)
            .await
    }

    pub async fn record_answer(
        &self,
        project_id: &str,
        video_id: &str,
        kind: QuestionKind,
        index: usize,
        answer: &str,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let video = self.ensure_editable(project_id, video_id).await?;
        let mut task = video.tasks.scripting.clone();
        let (questions, answers, field) = match kind {
            QuestionKind::Initial => (
                &task.initial_questions,
                &mut task.initial_answers,
                "initial_answers",
            ),
            QuestionKind::Refinement => (
                &task.location_questions,
                &mut task.user_experiences,
                "user_experiences",
            ),
        };
        if index >= questions.len() {
            return Err(WorkflowError::Validation(format!(
                "no question at index {}",
                index
            )));
        }
        answers.insert(index, answer.to_string());

        let answers_value = serde_json::to_value(match kind {
            QuestionKind::Initial => &task.initial_answers,
            QuestionKind::Refinement => &task.user_experiences,
        })
        .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
        // The whole map is one field group; replacing it wholesale keeps
        // last-write-wins semantics at the group level.
        self.store
            .update(
                &video_path(project_id, video_id),
                json!({"tasks": {"scripting": {field: answers_value}}}),
            )
            .await?;
        Ok(task)
    }

    /// Remove a question and re-sequence its answers atomically, then
    /// persist both as one field-group write.
    pub async fn remove_question(
        &self,
        project_id: &str,
        video_id: &str,
        kind: QuestionKind,
        index: usize,
    ) -> Result<ScriptingTaskState, WorkflowError> {
        let video = self.ensure_editable(project_id, video_id).await?;
        let mut task = video.tasks.scripting.clone();
        if !task.remove_question(kind, index) {
            return Err(WorkflowError::Validation(format!(
                "no question at index {}",
                index
            )));
        }
        // The compacted answer map replaces the stored one; a plain merge
        // would resurrect the dropped index.
        let answers_patch = |old: &BTreeMap<usize, String>,
                             new: &BTreeMap<usize, String>|
         -> Result<Value, WorkflowError> {
            let old = serde_json::to_value(old)
                .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
            let new = serde_json::to_value(new)
                .map_err(|e| WorkflowError::Persistence(e.to_string()))?;
            Ok(crate::store::replace_patch(&old, &new))
        };
        let before = &video.tasks.scripting;
        let fields = match kind {
            QuestionKind::Initial => json!({
                "initial_questions": task.initial_questions,
                "initial_answers":
                    answers_patch(&before.initial_answers, &task.initial_answers)?,
            }),
            QuestionKind::Refinement => json!({
                "location_questions": task.location_questions,
                "user_experiences":
                    answers_patch(&before.user_experiences, &task.user_experiences)?,
            }),
        };
        self.store
            .update(
                &video_path(project_id, video_id),
                json!({"tasks": {"scripting": fields}}),
            )
            .await?;
        Ok(task)
    }

    /// Validate a workspace autosave payload and wrap it into the task's
    /// document shape. When the first non-empty thoughts land on a pending
    /// task, the stage moves to `initial_thoughts` in the same payload.
    pub async fn prepare_workspace_edit(
        &self,
        project_id: &str,
        video_id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<Value, WorkflowError> {
        let video = self.ensure_editable(project_id, video_id).await?;
        for key in fields.keys() {
            if !EDITABLE_FIELDS.contains(&key.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "field `{}` is not editable through autosave",
                    key
                )));
            }
        }

        let mut scripting = Value::Object(fields);
        let task = &video.tasks.scripting;
        if task.scripting_stage == ScriptingStage::Pending {
            let thoughts_started = scripting
                .get("initial_thoughts")
                .and_then(Value::as_str)
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false);
            if thoughts_started {
                scripting["scripting_stage"] = json!(ScriptingStage::InitialThoughts);
                if task.highest_reached_stage == ScriptingStage::Pending {
                    scripting["highest_reached_stage"] = json!(ScriptingStage::InitialThoughts);
                }
            }
        }
        Ok(json!({"tasks": {"scripting": scripting}}))
    }

    /// Workspace open/resume: re-derive the on-camera projection from
    /// current project inventory (it may have changed since last visit)
    /// and hand back the task exactly as persisted otherwise.
    pub async fn open_workspace(
        &self,
        project_id: &str,
        video_id: &str,
    ) -> Result<Video, WorkflowError> {
        let mut video = self.load_video(project_id, video_id).await?;
        let project = self.load_project(project_id).await?;
        let featured = video.locations_featured.clone();
        engine::locations::refresh_on_camera_projection(
            &mut video.tasks.scripting,
            &featured,
            &project.footage_inventory,
        );
        // Cache the refreshed projection for rendering; it is never trusted
        // as stored truth beyond that.
        self.store
            .update(
                &video_path(project_id, video_id),
                json!({"tasks": {"scripting": {
                    "on_camera_locations": video.tasks.scripting.on_camera_locations
                }}}),
            )
            .await?;
        Ok(video)
    }
}
