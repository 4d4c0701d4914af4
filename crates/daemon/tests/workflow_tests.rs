//! End-to-end workflow tests against a tempfile-backed store and a
//! scripted generative client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use daemon::autosave::AutosaveBuffer;
use daemon::llm::{GenerateOutput, GenerateRequest, GenerativeClient, LlmError};
use daemon::store::{
    project_path, video_path, DocChange, DocumentStore, SqliteStore, StoreError, WriteOp,
};
use daemon::workflow::{RemovalMode, ScriptingWorkflow, WorkflowError};
use engine::{
    FootageInventoryEntry, Project, ProjectLocation, QuestionKind, ScriptingStage, StopType, Video,
};

struct MockClient {
    responses: Mutex<VecDeque<Result<GenerateOutput, LlmError>>>,
    delay: Mutex<Option<Duration>>,
    /// Applied to the store while the call is "out", to simulate a
    /// concurrent writer racing the generation.
    side_effect: Mutex<Option<(Arc<SqliteStore>, String, Value)>>,
}

impl MockClient {
    fn new() -> Arc<Self> {
        Arc::new(MockClient {
            responses: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            side_effect: Mutex::new(None),
        })
    }

    fn push_structured(&self, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(GenerateOutput::Structured(value)));
    }

    fn push_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(GenerateOutput::Text(text.to_string())));
    }

    fn push_error(&self, err: LlmError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl GenerativeClient for MockClient {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateOutput, LlmError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let effect = self.side_effect.lock().unwrap().take();
        if let Some((store, path, fields)) = effect {
            store.update(&path, fields).await.unwrap();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted response".to_string())))
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    client: Arc<MockClient>,
    workflow: Arc<ScriptingWorkflow>,
}

fn inventory_entry(on_camera: bool) -> FootageInventoryEntry {
    FootageInventoryEntry {
        b_roll: true,
        on_camera,
        drone: false,
        stop_type: StopType::Major,
    }
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(&dir.path().join("docs.db")).unwrap());
    let client = MockClient::new();
    let workflow = Arc::new(ScriptingWorkflow::new(
        store.clone(),
        client.clone(),
        "Keep intros under 20 seconds.".to_string(),
    ));

    let mut project = Project::new("Scotland Trip");
    project.id = "p1".to_string();
    for (name, on_camera) in [("Edinburgh", true), ("Stirling", false), ("Skye", true)] {
        project.locations.push(ProjectLocation {
            name: name.to_string(),
            place_id: None,
            lat: None,
            lng: None,
        });
        project
            .footage_inventory
            .insert(name.to_string(), inventory_entry(on_camera));
    }
    store
        .set(&project_path("p1"), serde_json::to_value(&project).unwrap())
        .await
        .unwrap();

    let mut video = Video::new("p1", "Highlands Loop");
    video.id = "v1".to_string();
    video.locations_featured = vec![
        "Edinburgh".to_string(),
        "Stirling".to_string(),
        "Skye".to_string(),
    ];
    store
        .set(&video_path("p1", "v1"), serde_json::to_value(&video).unwrap())
        .await
        .unwrap();

    Fixture {
        _dir: dir,
        store,
        client,
        workflow,
    }
}

async fn set_task_fields(store: &SqliteStore, vid: &str, fields: Value) {
    store
        .update(
            &video_path("p1", vid),
            json!({"tasks": {"scripting": fields}}),
        )
        .await
        .unwrap();
}

async fn video_doc(store: &SqliteStore, vid: &str) -> Value {
    store.get(&video_path("p1", vid)).await.unwrap().unwrap()
}

#[tokio::test]
async fn clarify_vision_advances_to_initial_qa() {
    let fx = fixture().await;
    set_task_fields(&fx.store, "v1", json!({"initial_thoughts": "We visited three castles"}))
        .await;
    fx.client
        .push_structured(json!({"questions": ["What surprised you most?"]}));

    let state = fx.workflow.clarify_vision("p1", "v1").await.unwrap();
    assert_eq!(state.scripting_stage, ScriptingStage::InitialQa);
    assert_eq!(state.initial_questions.len(), 1);
    assert!(state.initial_answers.is_empty());

    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["scripting_stage"],
        json!("initial_qa")
    );
}

#[tokio::test]
async fn empty_thoughts_block_before_any_call() {
    let fx = fixture().await;
    let err = fx.workflow.clarify_vision("p1", "v1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    // The scripted queue was never consumed.
    assert!(fx.client.responses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_response_leaves_document_bit_identical() {
    let fx = fixture().await;
    set_task_fields(&fx.store, "v1", json!({"initial_thoughts": "notes"})).await;
    let before = video_doc(&fx.store, "v1").await;

    fx.client.push_structured(json!({"wrong_key": []}));
    let err = fx.workflow.clarify_vision("p1", "v1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::MalformedResponse(_)));

    let after = video_doc(&fx.store, "v1").await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn timeout_surfaces_distinctly_and_allows_retry() {
    let fx = fixture().await;
    set_task_fields(
        &fx.store,
        "v1",
        json!({
            "initial_thoughts": "notes",
            "script_plan": "plan",
            "refined_script_plan": "refined plan",
            "scripting_stage": "refined_plan_review",
            "highest_reached_stage": "refined_plan_review",
        }),
    )
    .await;

    fx.client.push_error(LlmError::Timeout(120));
    let err = fx.workflow.generate_full_script("p1", "v1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout(120)));
    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["scripting_stage"],
        json!("refined_plan_review")
    );

    // The in-flight slot was released; the retry goes through.
    fx.client.push_structured(json!({"finalScript": "VO: take two"}));
    let state = fx.workflow.generate_full_script("p1", "v1").await.unwrap();
    assert_eq!(state.scripting_stage, ScriptingStage::FullScriptReview);
    assert_eq!(state.script, "VO: take two");
}

#[tokio::test]
async fn concurrent_identical_transition_is_rejected() {
    let fx = fixture().await;
    set_task_fields(&fx.store, "v1", json!({"initial_thoughts": "notes"})).await;
    *fx.client.delay.lock().unwrap() = Some(Duration::from_millis(200));
    fx.client.push_structured(json!({"questions": ["q?"]}));

    let workflow = fx.workflow.clone();
    let first = tokio::spawn(async move { workflow.clarify_vision("p1", "v1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = fx.workflow.clarify_vision("p1", "v1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Busy(_)));
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn stale_task_discards_late_result() {
    let fx = fixture().await;
    set_task_fields(&fx.store, "v1", json!({"initial_thoughts": "notes"})).await;
    // While the call is out, someone else advances the task.
    *fx.client.side_effect.lock().unwrap() = Some((
        fx.store.clone(),
        video_path("p1", "v1"),
        json!({"tasks": {"scripting": {"scripting_stage": "draft_outline_review"}}}),
    ));
    fx.client.push_structured(json!({"questions": ["q?"]}));

    let err = fx.workflow.clarify_vision("p1", "v1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Stale));
    let doc = video_doc(&fx.store, "v1").await;
    // The late result was not merged over the newer state.
    assert_eq!(
        doc["tasks"]["scripting"]["scripting_stage"],
        json!("draft_outline_review")
    );
    assert_eq!(doc["tasks"]["scripting"]["initial_questions"], json!([]));
}

#[tokio::test]
async fn full_pipeline_reaches_complete_and_mirrors_script() {
    let fx = fixture().await;
    set_task_fields(&fx.store, "v1", json!({"initial_thoughts": "We visited three castles"}))
        .await;

    fx.client
        .push_structured(json!({"questions": ["What surprised you most?", "Best castle?"]}));
    fx.workflow.clarify_vision("p1", "v1").await.unwrap();
    fx.workflow
        .record_answer("p1", "v1", QuestionKind::Initial, 0, "The scale of Stirling")
        .await
        .unwrap();

    fx.client
        .push_structured(json!({"draftOutline": "1. Cold open\n2. Castle tour"}));
    fx.workflow.generate_draft_outline("p1", "v1").await.unwrap();

    fx.client
        .push_structured(json!({"locationQuestions": ["How was the Skye weather?"]}));
    fx.workflow
        .generate_refinement_questions("p1", "v1")
        .await
        .unwrap();
    fx.workflow
        .record_answer("p1", "v1", QuestionKind::Refinement, 0, "Sideways rain")
        .await
        .unwrap();

    let state = fx.workflow.proceed_to_on_camera("p1", "v1").await.unwrap();
    // Stirling has no on-camera footage, so the projection skips it.
    assert_eq!(
        state.on_camera_locations,
        vec!["Edinburgh".to_string(), "Skye".to_string()]
    );

    set_task_fields(
        &fx.store,
        "v1",
        json!({"full_transcript": "raw take", "on_camera_input_mode": "transcript"}),
    )
    .await;
    fx.client.push_structured(json!({
        "Edinburgh": ["welcome to the castle"],
        "Skye": ["the weather turned"]
    }));
    fx.workflow.parse_transcript("p1", "v1").await.unwrap();

    fx.client
        .push_structured(json!({"refinedScriptPlan": "plan with on-camera beats"}));
    fx.workflow.generate_refined_plan("p1", "v1").await.unwrap();

    fx.client.push_structured(json!({"finalScript": "VO: full script"}));
    fx.workflow.generate_full_script("p1", "v1").await.unwrap();

    fx.client.push_text("VO: tighter script");
    let state = fx
        .workflow
        .refine_script("p1", "v1", "make it tighter")
        .await
        .unwrap();
    assert_eq!(state.script, "VO: tighter script");
    assert_eq!(state.scripting_stage, ScriptingStage::FullScriptReview);

    let state = fx.workflow.save_and_complete("p1", "v1").await.unwrap();
    assert!(state.complete);
    assert_eq!(state.scripting_stage, ScriptingStage::Complete);

    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(doc["script"], json!("VO: tighter script"));
}

#[tokio::test]
async fn completed_task_rejects_edits_until_reopened() {
    let fx = fixture().await;
    set_task_fields(
        &fx.store,
        "v1",
        json!({
            "initial_thoughts": "notes",
            "script": "final",
            "scripting_stage": "complete",
            "highest_reached_stage": "complete",
            "complete": true,
            "initial_questions": ["q?"],
        }),
    )
    .await;

    let err = fx
        .workflow
        .record_answer("p1", "v1", QuestionKind::Initial, 0, "late edit")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let state = fx.workflow.reopen("p1", "v1").await.unwrap();
    assert!(!state.complete);
    assert_eq!(state.scripting_stage, ScriptingStage::FullScriptReview);

    fx.workflow
        .record_answer("p1", "v1", QuestionKind::Initial, 0, "now it sticks")
        .await
        .unwrap();
}

#[tokio::test]
async fn removing_question_compacts_persisted_answers() {
    let fx = fixture().await;
    set_task_fields(
        &fx.store,
        "v1",
        json!({
            "location_questions": ["q0", "q1", "q2"],
            "user_experiences": {"0": "a", "1": "b", "2": "c"},
        }),
    )
    .await;

    let state = fx
        .workflow
        .remove_question("p1", "v1", QuestionKind::Refinement, 1)
        .await
        .unwrap();
    assert_eq!(state.location_questions, vec!["q0", "q2"]);

    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["user_experiences"],
        json!({"0": "a", "1": "c"})
    );
}

#[tokio::test]
async fn video_remove_spares_inventory_while_siblings_reference_it() {
    let fx = fixture().await;
    let mut sibling = Video::new("p1", "Skye Deep Dive");
    sibling.id = "v2".to_string();
    sibling.locations_featured = vec!["Skye".to_string()];
    fx.store
        .set(
            &video_path("p1", "v2"),
            serde_json::to_value(&sibling).unwrap(),
        )
        .await
        .unwrap();

    let video = fx
        .workflow
        .remove_location("p1", "v1", "Skye", RemovalMode::VideoRemove)
        .await
        .unwrap();
    assert!(!video.locations_featured.contains(&"Skye".to_string()));

    // v2 still references Skye, so the project keeps it.
    let project_doc = fx.store.get(&project_path("p1")).await.unwrap().unwrap();
    assert!(project_doc["footage_inventory"].get("Skye").is_some());

    fx.workflow
        .remove_location("p1", "v2", "Skye", RemovalMode::VideoRemove)
        .await
        .unwrap();
    let project_doc = fx.store.get(&project_path("p1")).await.unwrap().unwrap();
    assert!(project_doc["footage_inventory"].get("Skye").is_none());
    let names: Vec<&str> = project_doc["locations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|l| l["name"].as_str())
        .collect();
    assert!(!names.contains(&"Skye"));
}

#[tokio::test]
async fn script_only_removal_is_soft_and_idempotent() {
    let fx = fixture().await;
    fx.workflow
        .remove_location("p1", "v1", "Skye", RemovalMode::ScriptOnly)
        .await
        .unwrap();
    fx.workflow
        .remove_location("p1", "v1", "Skye", RemovalMode::ScriptOnly)
        .await
        .unwrap();

    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["scripting_locations_removed"],
        json!(["Skye"])
    );
    // Still featured on the video and still in the project inventory.
    assert!(doc["locations_featured"]
        .as_array()
        .unwrap()
        .contains(&json!("Skye")));
    let project_doc = fx.store.get(&project_path("p1")).await.unwrap().unwrap();
    assert!(project_doc["footage_inventory"].get("Skye").is_some());

    // Projection derived on workspace open excludes the soft-removed stop.
    let video = fx.workflow.open_workspace("p1", "v1").await.unwrap();
    assert_eq!(
        video.tasks.scripting.on_camera_locations,
        vec!["Edinburgh".to_string()]
    );
}

#[tokio::test]
async fn open_workspace_rederives_projection_from_current_inventory() {
    let fx = fixture().await;
    let video = fx.workflow.open_workspace("p1", "v1").await.unwrap();
    assert_eq!(
        video.tasks.scripting.on_camera_locations,
        vec!["Edinburgh".to_string(), "Skye".to_string()]
    );

    // Inventory changed since the last visit: Stirling gained on-camera.
    fx.store
        .update(
            &project_path("p1"),
            json!({"footage_inventory": {"Stirling": {"on_camera": true}}}),
        )
        .await
        .unwrap();
    let video = fx.workflow.open_workspace("p1", "v1").await.unwrap();
    assert_eq!(
        video.tasks.scripting.on_camera_locations,
        vec![
            "Edinburgh".to_string(),
            "Stirling".to_string(),
            "Skye".to_string()
        ]
    );
}

#[tokio::test]
async fn readding_location_clears_soft_exclusion() {
    let fx = fixture().await;
    fx.workflow
        .remove_location("p1", "v1", "Skye", RemovalMode::ScriptOnly)
        .await
        .unwrap();
    let video = fx
        .workflow
        .add_location_to_video("p1", "v1", "Skye")
        .await
        .unwrap();
    assert!(video
        .tasks
        .scripting
        .scripting_locations_removed
        .is_empty());

    let video = fx.workflow.open_workspace("p1", "v1").await.unwrap();
    assert!(video
        .tasks
        .scripting
        .on_camera_locations
        .contains(&"Skye".to_string()));
}

#[tokio::test]
async fn task_state_round_trips_through_store() {
    let fx = fixture().await;
    set_task_fields(
        &fx.store,
        "v1",
        json!({
            "scripting_stage": "refinement_qa",
            "highest_reached_stage": "refinement_qa",
            "initial_thoughts": "We visited three castles",
            "initial_questions": ["q1", "q2"],
            "initial_answers": {"1": "a2"},
            "script_plan": "1. Cold open",
            "location_questions": ["weather?"],
            "user_experiences": {"0": "rain"},
        }),
    )
    .await;

    let doc = video_doc(&fx.store, "v1").await;
    let video: Video = serde_json::from_value(doc.clone()).unwrap();
    let task = &video.tasks.scripting;
    assert_eq!(task.scripting_stage, ScriptingStage::RefinementQa);
    assert_eq!(task.initial_answers.get(&1).map(String::as_str), Some("a2"));
    assert_eq!(task.user_experiences.get(&0).map(String::as_str), Some("rain"));

    // Writing the deserialized state back reproduces the same document.
    fx.store
        .set(&video_path("p1", "v1"), serde_json::to_value(&video).unwrap())
        .await
        .unwrap();
    assert_eq!(video_doc(&fx.store, "v1").await, doc);
}

#[tokio::test(start_paused = true)]
async fn autosave_waits_out_the_quiet_window() {
    let fx = fixture().await;
    let autosave = AutosaveBuffer::new(fx.store.clone(), Duration::from_millis(1500));
    let path = video_path("p1", "v1");

    autosave.stage(&path, json!({"tasks": {"scripting": {"initial_thoughts": "draft one"}}}));
    assert_eq!(autosave.flush_due().await.unwrap(), 0);

    // A second edit inside the window restarts the debounce.
    tokio::time::advance(Duration::from_millis(1000)).await;
    autosave.stage(&path, json!({"tasks": {"scripting": {"initial_thoughts": "draft two"}}}));
    tokio::time::advance(Duration::from_millis(1000)).await;
    assert_eq!(autosave.flush_due().await.unwrap(), 0);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(autosave.flush_due().await.unwrap(), 1);
    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["initial_thoughts"],
        json!("draft two")
    );
}

#[tokio::test]
async fn flush_now_writes_immediately_on_close() {
    let fx = fixture().await;
    let autosave = AutosaveBuffer::new(fx.store.clone(), Duration::from_millis(1500));
    let path = video_path("p1", "v1");

    autosave.stage(&path, json!({"tasks": {"scripting": {"script_plan": "typed just now"}}}));
    autosave.flush_now(&path).await.unwrap();
    assert!(!autosave.has_pending(&path));
    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["script_plan"],
        json!("typed just now")
    );
}

#[tokio::test]
async fn draft_delete_and_promote() {
    let fx = fixture().await;
    let autosave = AutosaveBuffer::new(fx.store.clone(), Duration::from_millis(1500));

    // Abandon: pending edits die with the draft, even unopened.
    autosave.stage("drafts/d1", json!({"title": "half-typed"}));
    autosave.delete_draft("d1").await.unwrap();
    assert!(fx.store.get("drafts/d1").await.unwrap().is_none());
    assert!(!autosave.has_pending("drafts/d1"));

    // Promote: pending edits flush, then the body moves atomically.
    autosave.stage(
        "drafts/d2",
        json!({"title": "Glencoe", "project_id": "p1", "id": "v9",
               "concept": "", "locations_featured": [], "tasks": {"scripting": {}}}),
    );
    let body = autosave
        .promote_draft("d2", &video_path("p1", "v9"))
        .await
        .unwrap();
    assert_eq!(body["title"], json!("Glencoe"));
    assert!(fx.store.get("drafts/d2").await.unwrap().is_none());
    assert!(fx
        .store
        .get(&video_path("p1", "v9"))
        .await
        .unwrap()
        .is_some());
}

/// Store whose updates can be switched to fail, for flush-retry tests.
struct FlakyStore {
    inner: Arc<SqliteStore>,
    fail_updates: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, body: Value) -> Result<(), StoreError> {
        self.inner.set(path, body).await
    }

    async fn update(&self, path: &str, fields: Value) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("store unavailable".to_string()));
        }
        self.inner.update(path, fields).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.inner.batch_write(ops).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.inner.list(prefix).await
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DocChange> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn video_remove_purges_stored_dialogue_for_the_location() {
    let fx = fixture().await;
    set_task_fields(
        &fx.store,
        "v1",
        json!({
            "on_camera_descriptions": {
                "Edinburgh": ["line at the castle"],
                "Skye": ["line in the rain"],
            },
        }),
    )
    .await;

    fx.workflow
        .remove_location("p1", "v1", "Skye", RemovalMode::VideoRemove)
        .await
        .unwrap();

    let doc = video_doc(&fx.store, "v1").await;
    assert_eq!(
        doc["tasks"]["scripting"]["on_camera_descriptions"],
        json!({"Edinburgh": ["line at the castle"]})
    );
}

#[tokio::test]
async fn autosave_keeps_failed_flushes_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let inner = Arc::new(SqliteStore::new(&dir.path().join("docs.db")).unwrap());
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        fail_updates: AtomicBool::new(true),
    });
    let autosave = AutosaveBuffer::new(store.clone(), Duration::from_millis(0));

    autosave.stage("drafts/d1", json!({"title": "keep me"}));
    assert!(autosave.flush_due().await.is_err());
    assert!(autosave.has_pending("drafts/d1"));

    // flush_now failures keep the edits around too.
    assert!(autosave.flush_now("drafts/d1").await.is_err());
    assert!(autosave.has_pending("drafts/d1"));

    store.fail_updates.store(false, Ordering::SeqCst);
    assert_eq!(autosave.flush_due().await.unwrap(), 1);
    assert_eq!(
        inner.get("drafts/d1").await.unwrap().unwrap()["title"],
        json!("keep me")
    );
}

#[tokio::test]
async fn first_thoughts_move_a_pending_task_onto_the_board() {
    let fx = fixture().await;
    let mut fields = serde_json::Map::new();
    fields.insert(
        "initial_thoughts".to_string(),
        json!("We visited three castles"),
    );
    let payload = fx
        .workflow
        .prepare_workspace_edit("p1", "v1", fields)
        .await
        .unwrap();
    assert_eq!(
        payload["tasks"]["scripting"]["scripting_stage"],
        json!("initial_thoughts")
    );

    fx.store
        .update(&video_path("p1", "v1"), payload)
        .await
        .unwrap();
    let video = fx.workflow.load_video("p1", "v1").await.unwrap();
    assert_eq!(
        video.tasks.scripting.scripting_stage,
        ScriptingStage::InitialThoughts
    );
    assert_eq!(
        video.tasks.scripting.highest_reached_stage,
        ScriptingStage::InitialThoughts
    );

    // Once the task has advanced, thought edits never touch the stage.
    set_task_fields(
        &fx.store,
        "v1",
        json!({"scripting_stage": "initial_qa", "highest_reached_stage": "initial_qa"}),
    )
    .await;
    let mut fields = serde_json::Map::new();
    fields.insert("initial_thoughts".to_string(), json!("more notes"));
    let payload = fx
        .workflow
        .prepare_workspace_edit("p1", "v1", fields)
        .await
        .unwrap();
    assert!(payload["tasks"]["scripting"].get("scripting_stage").is_none());
}

#[tokio::test]
async fn workspace_edit_rejects_non_editable_fields() {
    let fx = fixture().await;
    let mut fields = serde_json::Map::new();
    fields.insert("complete".to_string(), json!(true));
    let err = fx
        .workflow
        .prepare_workspace_edit("p1", "v1", fields)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}
