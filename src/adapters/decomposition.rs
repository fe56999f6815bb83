//! Break one overwhelming task into a short ordered list of shards.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::prompt::{build_user_message, number_field, parse_json_reply, string_field};
use super::LanguageModel;
use crate::core::context::ContextSnapshot;
use crate::domain::{Correction, Gravity, Task};
use crate::error::PipelineError;

pub const DECOMPOSITION_SYSTEM_PROMPT: &str = r#"You help a person who freezes in front of big tasks.

Break the task into 3 to 5 small, concrete steps that can each be started without further planning. Order them in the sequence they should be done.

Return a single JSON object:
{
  "shards": [
    {"title": "...", "description": "...", "gravity": "Low", "estimated_minutes": 10}
  ],
  "reasoning": "one sentence on how you split it"
}

"gravity" is "Low", "Standard" or "High"; prefer Low. Keep titles under 8 words.
Return JSON only, with no commentary."#;

/// One step proposed by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShardDescriptor {
    pub title: Option<String>,
    pub description: Option<String>,
    pub gravity: Option<String>,
    pub estimated_minutes: Option<u32>,
}

impl ShardDescriptor {
    fn from_value(value: &Value) -> Self {
        match value {
            // A bare string is taken as the title
            Value::String(s) => Self {
                title: Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                ..Default::default()
            },
            _ => Self {
                title: string_field(value, "title"),
                description: string_field(value, "description"),
                gravity: string_field(value, "gravity"),
                estimated_minutes: number_field(value, "estimated_minutes")
                    .filter(|m| m.is_finite() && *m >= 0.0)
                    .map(|m| m.round() as u32),
            },
        }
    }

    /// Gravity, defaulting to `Low`
    pub fn gravity(&self) -> Gravity {
        self.gravity
            .as_deref()
            .and_then(Gravity::parse_lenient)
            .unwrap_or(Gravity::Low)
    }
}

/// The model's proposed split
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Decomposition {
    pub shards: Vec<ShardDescriptor>,
    pub reasoning: String,
}

impl Decomposition {
    pub fn from_value(value: &Value) -> Self {
        let shards = match value.get("shards") {
            Some(Value::Array(items)) => items
                .iter()
                .map(ShardDescriptor::from_value)
                .filter(|s| s.title.is_some() || s.description.is_some())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            shards,
            reasoning: string_field(value, "reasoning").unwrap_or_default(),
        }
    }
}

/// Describe the parent for the model: title, then any extra detail
fn describe(task: &Task) -> String {
    let mut subject = task.title.clone();
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        subject.push_str("\n\nDetails: ");
        subject.push_str(description);
    }
    if task.content != task.title {
        subject.push_str("\n\nOriginal note: ");
        subject.push_str(&task.content);
    }
    if let Some(project) = &task.project {
        subject.push_str("\n\nProject: ");
        subject.push_str(project);
    }
    subject
}

/// Ask the model to split `task`
pub async fn decompose_task(
    llm: &dyn LanguageModel,
    task: &Task,
    context: &ContextSnapshot,
    corrections: &[Correction],
    today: NaiveDate,
) -> Result<Decomposition, PipelineError> {
    let message = build_user_message("Task to break down", &describe(task), context, corrections, today);
    let reply = llm.complete(DECOMPOSITION_SYSTEM_PROMPT, &message).await?;
    let value = parse_json_reply(&reply)?;

    Ok(Decomposition::from_value(&value))
}
