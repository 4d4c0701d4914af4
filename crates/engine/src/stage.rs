use serde::{Deserialize, Serialize};

/// Canonical scripting workflow stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptingStage {
    Pending,
    InitialThoughts,
    InitialQa,
    DraftOutlineReview,
    RefinementQa,
    OnCameraQa,
    ReviewParsedTranscript,
    RefinedPlanReview,
    FullScriptReview,
    Complete,
}

pub const STAGE_SEQUENCE: [ScriptingStage; 10] = [
    ScriptingStage::Pending,
    ScriptingStage::InitialThoughts,
    ScriptingStage::InitialQa,
    ScriptingStage::DraftOutlineReview,
    ScriptingStage::RefinementQa,
    ScriptingStage::OnCameraQa,
    ScriptingStage::ReviewParsedTranscript,
    ScriptingStage::RefinedPlanReview,
    ScriptingStage::FullScriptReview,
    ScriptingStage::Complete,
];

impl ScriptingStage {
    /// Index of this stage in the canonical sequence.
    pub fn position(&self) -> usize {
        STAGE_SEQUENCE
            .iter()
            .position(|s| s == self)
            .unwrap_or(0)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScriptingStage::Complete)
    }

    /// The later of two stages in canonical order.
    pub fn max(self, other: ScriptingStage) -> ScriptingStage {
        if other.position() > self.position() {
            other
        } else {
            self
        }
    }
}

impl Default for ScriptingStage {
    fn default() -> Self {
        ScriptingStage::Pending
    }
}

/// A stage is navigable when the task is already complete (free review of
/// everything) or when the stage has been reached before. Users can step
/// back through completed stages but never jump ahead of their progress.
pub fn is_stage_unlocked(
    stage: ScriptingStage,
    highest_reached: ScriptingStage,
    task_complete: bool,
) -> bool {
    if task_complete {
        return true;
    }
    stage.position() <= highest_reached.position()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_positions_are_strictly_increasing() {
        for pair in STAGE_SEQUENCE.windows(2) {
            assert!(pair[0].position() < pair[1].position());
        }
    }

    #[test]
    fn unlock_allows_reached_stages_only() {
        let highest = ScriptingStage::RefinementQa;
        assert!(is_stage_unlocked(ScriptingStage::Pending, highest, false));
        assert!(is_stage_unlocked(ScriptingStage::InitialQa, highest, false));
        assert!(is_stage_unlocked(ScriptingStage::RefinementQa, highest, false));
        assert!(!is_stage_unlocked(ScriptingStage::OnCameraQa, highest, false));
        assert!(!is_stage_unlocked(ScriptingStage::Complete, highest, false));
    }

    #[test]
    fn complete_task_unlocks_everything() {
        for stage in STAGE_SEQUENCE {
            assert!(is_stage_unlocked(stage, ScriptingStage::Complete, true));
        }
    }

    #[test]
    fn stage_names_serialize_snake_case() {
        let json = serde_json::to_string(&ScriptingStage::ReviewParsedTranscript).unwrap();
        assert_eq!(json, "\"review_parsed_transcript\"");
        let back: ScriptingStage = serde_json::from_str("\"draft_outline_review\"").unwrap();
        assert_eq!(back, ScriptingStage::DraftOutlineReview);
    }
}
