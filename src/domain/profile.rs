//! Per-user personalisation state.
//!
//! Profiles, projects and known people bias transcription (as vocabulary
//! hints) and extraction (as context handed to the model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Personalisation state, one per user.
///
/// Keyword lists are kept as the raw JSON text found in storage so that a
/// corrupt column degrades to defaults at read time instead of failing the
/// whole profile load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,

    pub display_name: Option<String>,

    /// JSON array of words that mark a task as heavy
    pub high_gravity_keywords: Option<String>,

    /// JSON array of words that mark a task as light
    pub low_gravity_keywords: Option<String>,

    /// JSON array of extra vocabulary for the transcription provider
    pub deepgram_keywords: Option<String>,

    pub timezone: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Empty profile for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            display_name: None,
            high_gravity_keywords: None,
            low_gravity_keywords: None,
            deepgram_keywords: None,
            timezone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store a keyword list as JSON, preserving order and duplicates
    pub fn encode_keywords(words: &[String]) -> Result<String, serde_json::Error> {
        serde_json::to_string(words)
    }
}

/// A user-scoped project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Someone the user mentions often
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPerson {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    /// Free text such as "manager" or "sister"
    pub context: Option<String>,
}

/// A user's override of one AI-extracted field. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub id: i64,
    pub user_id: String,
    pub task_id: Option<i64>,
    pub field_name: String,
    pub original_value: Option<String>,
    pub corrected_value: Option<String>,
    /// Transcript the original value was extracted from
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One field override as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCorrection {
    pub field_name: String,
    #[serde(default)]
    pub original_value: Option<String>,
    #[serde(default)]
    pub corrected_value: Option<String>,
}

impl FieldCorrection {
    pub fn new(
        field_name: impl Into<String>,
        original_value: Option<String>,
        corrected_value: Option<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_value,
            corrected_value,
        }
    }
}
