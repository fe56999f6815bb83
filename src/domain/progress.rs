//! Progress events pushed to clients while a capture runs.
//!
//! Every stage boundary of the capture pipeline produces one event. `Complete`
//! and `Error` are terminal: nothing follows them for the same request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskStatus};
use crate::error::{ErrorKind, PipelineError};

/// A single event on a request's progress stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub request_id: Uuid,

    /// Position in the request's log, starting at 0
    pub sequence: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn stage(&self) -> ProgressStage {
        self.kind.stage()
    }
}

/// Stage-specific payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressKind {
    ContextLoading,

    ContextLoaded {
        vocabulary_size: usize,
        projects: usize,
        people: usize,
    },

    TranscriptionStart {
        audio_bytes: usize,
    },

    TranscriptionComplete {
        transcript: String,
    },

    ProcessingStart,

    ProcessingComplete {
        title: String,
        status: TaskStatus,
    },

    Saving,

    Complete {
        outcome: CaptureOutcome,
    },

    Error {
        message: String,
        kind: ErrorKind,
    },
}

impl ProgressKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn stage(&self) -> ProgressStage {
        match self {
            Self::ContextLoading => ProgressStage::ContextLoading,
            Self::ContextLoaded { .. } => ProgressStage::ContextLoaded,
            Self::TranscriptionStart { .. } => ProgressStage::TranscriptionStart,
            Self::TranscriptionComplete { .. } => ProgressStage::TranscriptionComplete,
            Self::ProcessingStart => ProgressStage::ProcessingStart,
            Self::ProcessingComplete { .. } => ProgressStage::ProcessingComplete,
            Self::Saving => ProgressStage::Saving,
            Self::Complete { .. } => ProgressStage::Complete,
            Self::Error { .. } => ProgressStage::Error,
        }
    }

    /// Terminal error event for a pipeline failure
    pub fn from_error(error: &PipelineError) -> Self {
        Self::Error {
            message: error.to_string(),
            kind: error.kind(),
        }
    }
}

/// Stage label of a request, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Registered, nothing emitted yet
    Pending,
    ContextLoading,
    ContextLoaded,
    TranscriptionStart,
    TranscriptionComplete,
    ProcessingStart,
    ProcessingComplete,
    Saving,
    Complete,
    Error,
}

/// What a capture request resolved to.
///
/// Serialises as `{success, task, transcript}` on success and as
/// `{success: false, error, is_unintelligible}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unintelligible: bool,
}

impl CaptureOutcome {
    pub fn saved(task: Task, transcript: String) -> Self {
        Self {
            success: true,
            task: Some(task),
            transcript: Some(transcript),
            error: None,
            error_kind: None,
            is_unintelligible: false,
        }
    }

    /// The audio held no words; the user should simply try again
    pub fn unintelligible() -> Self {
        Self {
            success: false,
            task: None,
            transcript: None,
            error: Some(PipelineError::UnintelligibleAudio.to_string()),
            error_kind: Some(ErrorKind::Unintelligible),
            is_unintelligible: true,
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            task: None,
            transcript: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            is_unintelligible: false,
        }
    }
}
