//! Prompt assembly for each stage transition. Prompts are built from
//! persisted task state plus the static knowledge-base text only, never
//! from transient memory, so a retry after any failure reproduces the same
//! request.

use std::collections::BTreeMap;
use std::fmt::Write;

use engine::ScriptingTaskState;

fn preamble(knowledge_base: &str, role: &str) -> String {
    let mut text = format!(
        "You are a scriptwriting assistant for a travel YouTube channel. {}\n",
        role
    );
    if !knowledge_base.trim().is_empty() {
        let _ = write!(
            text,
            "\nChannel style guide:\n{}\n",
            knowledge_base.trim()
        );
    }
    text
}

fn numbered_qa(
    questions: &[String],
    answers: &BTreeMap<usize, String>,
) -> String {
    let mut text = String::new();
    for (i, question) in questions.iter().enumerate() {
        let answer = answers
            .get(&i)
            .map(String::as_str)
            .unwrap_or("(no answer given)");
        let _ = writeln!(text, "{}. Q: {}\n   A: {}", i + 1, question, answer);
    }
    text
}

pub fn clarify_vision(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    format!(
        "{}\nThe creator wrote down raw notes about the video they want to make:\n\n{}\n\n\
         Ask the clarifying questions you need before outlining this video.\n\
         Reply with JSON only: {{\"questions\": [\"...\"]}}",
        preamble(knowledge_base, "You turn raw creator notes into sharp clarifying questions."),
        task.initial_thoughts
    )
}

pub fn generate_draft_outline(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    format!(
        "{}\nRaw notes:\n{}\n\nClarifying Q&A:\n{}\n\
         Write a draft outline for the video as numbered sections.\n\
         Reply with JSON only: {{\"draftOutline\": \"...\"}}",
        preamble(knowledge_base, "You turn notes and answers into a video outline."),
        task.initial_thoughts,
        numbered_qa(&task.initial_questions, &task.initial_answers)
    )
}

pub fn refine_outline(
    knowledge_base: &str,
    task: &ScriptingTaskState,
    instructions: &str,
) -> String {
    format!(
        "{}\nCurrent outline:\n{}\n\nThe creator asked for these changes:\n{}\n\n\
         Rework the outline accordingly, keeping everything they did not ask to change.\n\
         Reply with JSON only: {{\"draftOutline\": \"...\"}}",
        preamble(knowledge_base, "You revise video outlines on request."),
        task.script_plan,
        instructions
    )
}

pub fn generate_refinement_questions(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    format!(
        "{}\nOutline:\n{}\n\n\
         Ask the creator concrete questions about their first-hand experiences at the \
         places in this outline, so the script can include real detail.\n\
         Reply with JSON only: {{\"locationQuestions\": [\"...\"]}}",
        preamble(knowledge_base, "You draw out first-hand detail the outline is missing."),
        task.script_plan
    )
}

pub fn parse_transcript(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    format!(
        "{}\nThe creator recorded on-camera segments at these locations: {}.\n\
         Here is the raw transcript of everything they said:\n\n{}\n\n\
         Split the transcript by location. Reply with JSON only: an object whose keys are \
         exactly the location names above and whose values are arrays of the dialogue lines \
         spoken there. Skip locations that never come up.",
        preamble(knowledge_base, "You attribute transcript lines to filming locations."),
        task.on_camera_locations.join(", "),
        task.full_transcript
    )
}

pub fn generate_refined_plan(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    let mut on_camera = String::new();
    for (location, lines) in &task.on_camera_descriptions {
        let _ = writeln!(on_camera, "{}:\n{}\n", location, lines.join("\n"));
    }
    format!(
        "{}\nOutline:\n{}\n\nOn-camera dialogue captured per location:\n{}\n\
         Merge the on-camera moments into the outline so voiceover and on-camera \
         segments hand off naturally.\n\
         Reply with JSON only: {{\"refinedScriptPlan\": \"...\"}}",
        preamble(knowledge_base, "You weave on-camera footage into the script plan."),
        task.script_plan,
        on_camera
    )
}

pub fn generate_full_script(knowledge_base: &str, task: &ScriptingTaskState) -> String {
    let plan = if task.refined_script_plan.trim().is_empty() {
        &task.script_plan
    } else {
        &task.refined_script_plan
    };
    let mut text = format!(
        "{}\nScript plan:\n{}\n",
        preamble(knowledge_base, "You write the final voiceover script."),
        plan
    );
    if task.refined_script_plan.trim().is_empty() {
        let _ = write!(
            text,
            "\nClarifying Q&A for extra context:\n{}",
            numbered_qa(&task.initial_questions, &task.initial_answers)
        );
    }
    let _ = write!(
        text,
        "\nWrite the complete voiceover script, ready to record.\n\
         Reply with JSON only: {{\"finalScript\": \"...\"}}"
    );
    text
}

pub fn refine_script(
    knowledge_base: &str,
    task: &ScriptingTaskState,
    instructions: &str,
) -> String {
    format!(
        "{}\nCurrent script:\n{}\n\nThe creator asked for these changes:\n{}\n\n\
         Reply with the full rewritten script as plain text, nothing else.",
        preamble(knowledge_base, "You revise voiceover scripts on request."),
        task.script,
        instructions
    )
}
