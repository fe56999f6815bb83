//! Turn a transcript into one structured task.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::prompt::{
    bool_field, build_user_message, number_field, parse_json_reply, string_field,
    string_list_field,
};
use super::LanguageModel;
use crate::core::context::ContextSnapshot;
use crate::domain::{Correction, Gravity};
use crate::error::PipelineError;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You turn short voice notes into tasks for a person who finds planning hard.

Read the transcript and return a single JSON object with these fields:
- "title": a short imperative title, at most 8 words
- "description": one sentence of useful detail, or null
- "gravity": "Low", "Standard" or "High". High is for draining or high-stakes work; use the user's high_gravity_keywords and low_gravity_keywords as hints
- "project": the name of one of the user's projects, or null
- "due_date": an ISO date (YYYY-MM-DD) if the note implies one, resolved against today's date, or null
- "tags": a list of short lowercase tags
- "project_confidence": a number from 0 to 1 saying how sure you are about the project
- "is_ambiguous": true if the note could reasonably mean several different tasks

Known people are context only; never use a person as a project.
Learn from the user's recent corrections.
Return JSON only, with no commentary."#;

/// What the model said about a transcript, with every field defaulted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub gravity: Option<String>,
    pub project: Option<String>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub project_confidence: Option<f64>,
    pub is_ambiguous: bool,
}

impl ExtractedTask {
    /// Read whatever fields are present; anything missing or mistyped stays unset
    pub fn from_value(value: &Value) -> Self {
        Self {
            title: string_field(value, "title"),
            description: string_field(value, "description"),
            gravity: string_field(value, "gravity"),
            project: string_field(value, "project"),
            due_date: string_field(value, "due_date"),
            tags: string_list_field(value, "tags"),
            project_confidence: number_field(value, "project_confidence")
                .or_else(|| number_field(value, "confidence")),
            is_ambiguous: bool_field(value, "is_ambiguous"),
        }
    }

    /// Gravity, defaulting to `Standard` when absent or unrecognised
    pub fn gravity(&self) -> Gravity {
        self.gravity
            .as_deref()
            .and_then(Gravity::parse_lenient)
            .unwrap_or_default()
    }

    /// Due date as a calendar date; full timestamps are truncated to the day
    pub fn due_date(&self) -> Option<NaiveDate> {
        let raw = self.due_date.as_deref()?.trim();
        let day = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    /// Confidence clamped into [0, 1]
    pub fn confidence(&self) -> Option<f64> {
        self.project_confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
    }
}

/// Ask the model for a structured task
pub async fn extract_task(
    llm: &dyn LanguageModel,
    transcript: &str,
    context: &ContextSnapshot,
    corrections: &[Correction],
    today: NaiveDate,
) -> Result<ExtractedTask, PipelineError> {
    let message = build_user_message("Transcript", transcript, context, corrections, today);
    let reply = llm.complete(EXTRACTION_SYSTEM_PROMPT, &message).await?;
    let value = parse_json_reply(&reply)?;

    Ok(ExtractedTask::from_value(&value))
}
