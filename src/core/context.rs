//! Per-user personalisation snapshot.
//!
//! Assembled from storage before every capture and breakdown. Missing or
//! unreadable profile data degrades to built-in defaults; only a failing
//! database surfaces as an error.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::UserProfile;
use crate::store::{Store, StoreError};

pub const DEFAULT_HIGH_GRAVITY_KEYWORDS: &[&str] = &[
    "taxes",
    "deadline",
    "interview",
    "presentation",
    "appointment",
    "report",
    "application",
];

pub const DEFAULT_LOW_GRAVITY_KEYWORDS: &[&str] = &[
    "email",
    "text",
    "call",
    "buy",
    "order",
    "reply",
    "water",
];

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Context handed to the transcription and extraction providers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub high_gravity_keywords: Vec<String>,

    pub low_gravity_keywords: Vec<String>,

    /// Transcription hints: user vocabulary, then project names, then people
    #[serde(skip_serializing)]
    pub vocabulary: Vec<String>,

    pub projects: Vec<ProjectContext>,

    pub people: Vec<PersonContext>,

    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectContext {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonContext {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            high_gravity_keywords: owned(DEFAULT_HIGH_GRAVITY_KEYWORDS),
            low_gravity_keywords: owned(DEFAULT_LOW_GRAVITY_KEYWORDS),
            vocabulary: Vec::new(),
            projects: Vec::new(),
            people: Vec::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl ContextSnapshot {
    /// Calendar date in the user's timezone, UTC when the zone is unknown
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).date_naive(),
            Err(_) => {
                warn!(timezone = %self.timezone, "Unknown timezone, using UTC dates");
                now.date_naive()
            }
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today_at(Utc::now())
    }
}

/// Build the snapshot for a user
pub fn load_context(store: &Store, user_id: &str) -> Result<ContextSnapshot, StoreError> {
    let profile = store.get_profile(user_id)?;
    let projects = store.list_projects(user_id)?;
    let people = store.list_people(user_id)?;

    let mut snapshot = match profile {
        Some(profile) => from_profile(&profile),
        None => {
            debug!(user_id, "No profile, using default context");
            ContextSnapshot::default()
        }
    };

    snapshot.vocabulary = dedup_preserving_order(
        std::mem::take(&mut snapshot.vocabulary)
            .into_iter()
            .chain(projects.iter().map(|p| p.name.clone()))
            .chain(people.iter().map(|p| p.name.clone())),
    );

    snapshot.projects = projects
        .into_iter()
        .map(|p| ProjectContext {
            name: p.name,
            description: p.description,
        })
        .collect();

    snapshot.people = people
        .into_iter()
        .map(|p| PersonContext {
            name: p.name,
            context: p.context,
        })
        .collect();

    Ok(snapshot)
}

fn from_profile(profile: &UserProfile) -> ContextSnapshot {
    ContextSnapshot {
        high_gravity_keywords: parse_keyword_list(
            "high_gravity_keywords",
            profile.high_gravity_keywords.as_deref(),
            DEFAULT_HIGH_GRAVITY_KEYWORDS,
        ),
        low_gravity_keywords: parse_keyword_list(
            "low_gravity_keywords",
            profile.low_gravity_keywords.as_deref(),
            DEFAULT_LOW_GRAVITY_KEYWORDS,
        ),
        vocabulary: parse_keyword_list("deepgram_keywords", profile.deepgram_keywords.as_deref(), &[]),
        projects: Vec::new(),
        people: Vec::new(),
        timezone: profile
            .timezone
            .clone()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
    }
}

/// Decode a stored JSON keyword list, falling back to `default` when the
/// column is empty or not a list of strings
fn parse_keyword_list(field: &str, raw: Option<&str>, default: &[&str]) -> Vec<String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return owned(default);
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(words) => words,
        Err(e) => {
            warn!(field, error = %e, "Unparseable keyword list, using defaults");
            owned(default)
        }
    }
}

/// Exact-string dedup keeping the first occurrence; blank entries dropped
pub fn dedup_preserving_order(words: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .into_iter()
        .filter(|w| !w.trim().is_empty())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
