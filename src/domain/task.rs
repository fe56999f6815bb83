//! Tasks, shards and their lifecycle.
//!
//! A task is created by the capture pipeline from a voice transcript. A task
//! with a `parent_task_id` is a shard: one step of a larger task that was
//! broken down by the breakdown pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Tag appended to tasks whose extraction needs a human look.
pub const NEEDS_SORTING_TAG: &str = "needs_sorting";

/// Tag carried by every shard.
pub const SHARD_TAG: &str = "shard";

/// Storage identifier of a task
pub type TaskId = i64;

/// A unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Owning user
    pub user_id: String,

    /// Raw captured text (the transcript for captured tasks). Never rewritten.
    pub content: String,

    pub title: String,

    pub description: Option<String>,

    pub status: TaskStatus,

    pub gravity: Gravity,

    /// Project reference, by name
    pub project: Option<String>,

    pub due_date: Option<NaiveDate>,

    pub tags: Vec<String>,

    /// Extraction confidence in [0, 1], when the model reported one
    pub confidence: Option<f64>,

    pub is_ambiguous: bool,

    /// Set on shards only
    pub parent_task_id: Option<TaskId>,

    /// 1-based position among sibling shards
    pub shard_order: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Whether this task is a shard of another task
    pub fn is_shard(&self) -> bool {
        self.parent_task_id.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Everything needed to insert a task; the store assigns `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub user_id: String,
    pub content: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub gravity: Gravity,
    pub project: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
    pub is_ambiguous: bool,
    pub parent_task_id: Option<TaskId>,
    pub shard_order: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl NewTask {
    /// A plain inbox task with no extraction metadata
    pub fn inbox(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            user_id: user_id.into(),
            title: content.clone(),
            content,
            description: None,
            status: TaskStatus::Inbox,
            gravity: Gravity::default(),
            project: None,
            due_date: None,
            tags: Vec::new(),
            confidence: None,
            is_ambiguous: false,
            parent_task_id: None,
            shard_order: None,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Captured and sorted, waiting to be picked up
    Inbox,

    /// Captured but the extraction was unsure; highlighted in the inbox view
    InboxReview,

    /// Being worked on
    Active,

    /// Done
    Complete,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::InboxReview => "inbox_review",
            Self::Active => "active",
            Self::Complete => "complete",
        }
    }

    /// Whether the task still needs doing
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Complete)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Inbox
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "inbox_review" => Ok(Self::InboxReview),
            "active" => Ok(Self::Active),
            "complete" | "completed" | "done" => Ok(Self::Complete),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Effort/energy classification of a task, orthogonal to its due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gravity {
    Low,
    Standard,
    High,
}

impl Gravity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Standard => "Standard",
            Self::High => "High",
        }
    }

    /// Lenient parse for model output ("low", "HIGH", "medium", ...)
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "light" | "easy" => Some(Self::Low),
            "standard" | "medium" | "normal" => Some(Self::Standard),
            "high" | "heavy" | "hard" => Some(Self::High),
            _ => None,
        }
    }
}

impl Default for Gravity {
    fn default() -> Self {
        Self::Standard
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gravity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("unknown gravity '{}'", s))
    }
}

/// Self-reported energy level used to pick a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    /// Gravities a user at this energy level can take on
    pub fn allowed_gravities(&self) -> &'static [Gravity] {
        match self {
            Self::Low => &[Gravity::Low],
            Self::Medium => &[Gravity::Low, Gravity::Standard],
            Self::High => &[Gravity::Low, Gravity::Standard, Gravity::High],
        }
    }

    pub fn allows(&self, gravity: Gravity) -> bool {
        self.allowed_gravities().contains(&gravity)
    }
}

impl FromStr for EnergyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "mid" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown energy level '{}'", other)),
        }
    }
}

/// Outcome of a status change, reporting the parent completion side effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub task: Task,

    /// True only for the call that moved the parent to `complete`
    pub parent_completed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TaskStatus::Inbox,
            TaskStatus::InboxReview,
            TaskStatus::Active,
            TaskStatus::Complete,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("done".parse::<TaskStatus>().unwrap(), TaskStatus::Complete);
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InboxReview).unwrap();
        assert_eq!(json, "\"inbox_review\"");
    }

    #[test]
    fn test_gravity_lenient_parse() {
        assert_eq!(Gravity::parse_lenient("low"), Some(Gravity::Low));
        assert_eq!(Gravity::parse_lenient(" HIGH "), Some(Gravity::High));
        assert_eq!(Gravity::parse_lenient("medium"), Some(Gravity::Standard));
        assert_eq!(Gravity::parse_lenient("cosmic"), None);
    }

    #[test]
    fn test_energy_level_gravity_filter() {
        assert!(EnergyLevel::Low.allows(Gravity::Low));
        assert!(!EnergyLevel::Low.allows(Gravity::Standard));
        assert!(EnergyLevel::Medium.allows(Gravity::Standard));
        assert!(!EnergyLevel::Medium.allows(Gravity::High));
        assert!(EnergyLevel::High.allows(Gravity::High));
    }

    #[test]
    fn test_new_task_inbox_defaults() {
        let task = NewTask::inbox("sam", "call the dentist");
        assert_eq!(task.title, "call the dentist");
        assert_eq!(task.status, TaskStatus::Inbox);
        assert_eq!(task.gravity, Gravity::Standard);
        assert!(task.tags.is_empty());
    }
}
