//! Message assembly and reply parsing shared by the LLM-backed adapters.

use chrono::NaiveDate;
use serde_json::Value;

use crate::core::context::ContextSnapshot;
use crate::domain::Correction;
use crate::error::PipelineError;

/// Most corrections ever rendered into a prompt
pub const MAX_CORRECTIONS: usize = 10;

/// Build the single user-role message: subject, JSON context, calibration hints
pub fn build_user_message(
    subject_label: &str,
    subject: &str,
    context: &ContextSnapshot,
    corrections: &[Correction],
    today: NaiveDate,
) -> String {
    let context_json = serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

    format!(
        "{label}:\n\"\"\"\n{subject}\n\"\"\"\n\n\
         Today's date: {today}\n\n\
         User context (JSON):\n{context_json}\n\n\
         Recent corrections made by this user (most recent first):\n{corrections}\n\n\
         Respond with JSON only.",
        label = subject_label,
        subject = subject.trim(),
        today = today.format("%Y-%m-%d"),
        context_json = context_json,
        corrections = render_corrections(corrections),
    )
}

/// One line per correction, newest first, capped at [`MAX_CORRECTIONS`]
pub fn render_corrections(corrections: &[Correction]) -> String {
    if corrections.is_empty() {
        return "No corrections yet.".to_string();
    }

    corrections
        .iter()
        .take(MAX_CORRECTIONS)
        .map(|c| {
            format!(
                "- {}: \"{}\" was corrected to \"{}\"",
                c.field_name,
                c.original_value.as_deref().unwrap_or(""),
                c.corrected_value.as_deref().unwrap_or(""),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove a surrounding ```json or bare ``` fence
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse a model reply as JSON, keeping the raw text on failure
pub fn parse_json_reply(raw: &str) -> Result<Value, PipelineError> {
    if raw.trim().is_empty() {
        return Err(PipelineError::MalformedResponse {
            reason: "empty response".to_string(),
            raw: raw.to_string(),
        });
    }

    serde_json::from_str(strip_code_fence(raw)).map_err(|e| PipelineError::MalformedResponse {
        reason: e.to_string(),
        raw: raw.to_string(),
    })
}

// Lenient field readers: the model's JSON is never trusted to match a schema.

pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn string_list_field(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
