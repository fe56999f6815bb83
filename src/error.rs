//! Error taxonomy for the capture and breakdown pipelines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced by adapters and pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider credential is not configured
    #[error("{service} service is not configured (missing API key)")]
    ServiceUnavailable { service: &'static str },

    /// The provider answered but heard nothing usable. Expected, user-facing.
    #[error("Could not understand the audio")]
    UnintelligibleAudio,

    #[error("Transcription failed: {message}")]
    TranscriptionFailed {
        status: Option<u16>,
        message: String,
    },

    /// The LLM provider rejected the request or could not be reached
    #[error("{service} request failed: {message}")]
    ProviderFailure {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// The LLM answered with something that is not JSON
    #[error("Malformed model response ({reason}): {raw}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Breakdown produced no shards")]
    EmptyDecomposition,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("A user id is required")]
    MissingUser,

    #[error("Task {0} is a shard and cannot be broken down further")]
    NestedShard(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    /// Coarse classification for callers rendering a message
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::UnintelligibleAudio => ErrorKind::Unintelligible,
            Self::TranscriptionFailed { .. } | Self::ProviderFailure { .. } => {
                ErrorKind::ProviderFailure
            }
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::EmptyDecomposition => ErrorKind::EmptyDecomposition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MissingUser | Self::NestedShard(_) | Self::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Self::Storage(_) => ErrorKind::PipelineFailure,
        }
    }

    /// Whether another attempt at the same provider call might succeed.
    ///
    /// Network errors and timeouts carry no status; 429 and 5xx are
    /// transient. Configuration and data problems never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TranscriptionFailed { status, .. } | Self::ProviderFailure { status, .. } => {
                match status {
                    None => true,
                    Some(code) => *code == 429 || *code >= 500,
                }
            }
            _ => false,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Caller-visible failure reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Deployment problem: a provider is not configured
    ServiceUnavailable,
    Unintelligible,
    /// Provider failed at runtime; retrying later may help
    ProviderFailure,
    /// Provider returned unusable data
    MalformedResponse,
    EmptyDecomposition,
    NotFound,
    InvalidInput,
    PipelineFailure,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_separate_configuration_from_data_and_transient() {
        let config = PipelineError::ServiceUnavailable { service: "llm" };
        let malformed = PipelineError::MalformedResponse {
            reason: "invalid JSON".into(),
            raw: "nope".into(),
        };
        let transient = PipelineError::ProviderFailure {
            service: "llm",
            status: Some(503),
            message: "overloaded".into(),
        };

        assert_eq!(config.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(malformed.kind(), ErrorKind::MalformedResponse);
        assert_eq!(transient.kind(), ErrorKind::ProviderFailure);
    }

    #[test]
    fn test_retryable_statuses() {
        let retry = |status| PipelineError::TranscriptionFailed {
            status,
            message: String::new(),
        };
        assert!(retry(None).is_retryable());
        assert!(retry(Some(429)).is_retryable());
        assert!(retry(Some(502)).is_retryable());
        assert!(!retry(Some(400)).is_retryable());
        assert!(!PipelineError::ServiceUnavailable { service: "x" }.is_retryable());
        assert!(!PipelineError::UnintelligibleAudio.is_retryable());
    }

    #[test]
    fn test_malformed_response_keeps_raw_content() {
        let err = PipelineError::MalformedResponse {
            reason: "invalid JSON".into(),
            raw: "I think the task is...".into(),
        };
        assert!(err.to_string().contains("I think the task is..."));
    }
}
