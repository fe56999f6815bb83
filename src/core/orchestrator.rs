//! Entry points for the capture and breakdown pipelines.
//!
//! The orchestrator owns the storage handle, the provider adapters and the
//! progress registry. It is cheap to clone, so a capture can be handed off
//! to a background task while the caller subscribes to its progress.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, Instrument};
use uuid::Uuid;

use crate::adapters::{AudioInput, LanguageModel, Transcriber};
use crate::domain::CaptureOutcome;
use crate::error::{PipelineError, Result};
use crate::store::Store;

use super::progress::ProgressRegistry;

/// Tunables shared by both pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Corrections handed to the model, newest first
    #[serde(default = "default_corrections_window")]
    pub corrections_window: usize,

    /// Extractions below this project confidence go to review
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    #[serde(default = "default_bundle_size")]
    pub default_bundle_size: usize,
}

fn default_corrections_window() -> usize {
    10
}

fn default_review_threshold() -> f64 {
    0.6
}

fn default_bundle_size() -> usize {
    3
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            corrections_window: default_corrections_window(),
            review_threshold: default_review_threshold(),
            default_bundle_size: default_bundle_size(),
        }
    }
}

/// Pipeline orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) store: Store,
    pub(crate) transcriber: Arc<dyn Transcriber>,
    pub(crate) llm: Arc<dyn LanguageModel>,
    pub(crate) progress: ProgressRegistry,
    pub(crate) settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LanguageModel>,
        progress: ProgressRegistry,
    ) -> Self {
        Self {
            store,
            transcriber,
            llm,
            progress,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a capture in the background and return its request id.
    ///
    /// Subscribe to the id on [`Orchestrator::progress`] to follow it. The
    /// pipeline runs to completion whether or not anyone is listening.
    pub fn submit_capture(&self, audio: AudioInput, user_id: &str) -> Result<Uuid> {
        let user_id = require_user(user_id)?.to_string();
        let request_id = Uuid::new_v4();
        self.progress.begin(request_id);

        info!(%request_id, %user_id, audio_bytes = audio.len(), "Capture submitted");

        let this = self.clone();
        let span = tracing::info_span!("capture_task", %request_id);
        tokio::spawn(
            async move {
                this.run_capture(request_id, &user_id, &audio).await;
            }
            .instrument(span),
        );

        Ok(request_id)
    }

    /// Run a capture inline, for callers without a push channel
    #[instrument(skip(self, audio), fields(audio_bytes = audio.len()))]
    pub async fn capture(&self, audio: AudioInput, user_id: &str) -> Result<(Uuid, CaptureOutcome)> {
        let user_id = require_user(user_id)?;
        let request_id = Uuid::new_v4();
        self.progress.begin(request_id);

        let outcome = self.run_capture(request_id, user_id, &audio).await;
        Ok((request_id, outcome))
    }
}

/// Reject empty user ids; there is no fallback identity
pub(crate) fn require_user(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::MissingUser);
    }
    Ok(trimmed)
}
