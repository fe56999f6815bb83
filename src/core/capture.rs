//! Capture pipeline: audio in, one stored task out.
//!
//! Stages: context -> transcription -> corrections -> extraction -> status
//! decision -> save. Every stage boundary publishes a progress event and the
//! request always ends with exactly one terminal event.

use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::adapters::{extract_task, AudioInput, ExtractedTask};
use crate::domain::{
    CaptureOutcome, NewTask, ProgressKind, TaskStatus, NEEDS_SORTING_TAG,
};
use crate::error::PipelineError;

use super::context::{dedup_preserving_order, load_context};
use super::orchestrator::Orchestrator;

/// Words kept when a title has to be cut from the transcript
const FALLBACK_TITLE_WORDS: usize = 8;

impl Orchestrator {
    /// Drive one capture to its terminal event
    #[instrument(skip(self, audio), fields(%request_id))]
    pub(crate) async fn run_capture(
        &self,
        request_id: Uuid,
        user_id: &str,
        audio: &AudioInput,
    ) -> CaptureOutcome {
        let outcome = match self.capture_stages(request_id, user_id, audio).await {
            Ok(outcome) => outcome,
            Err(PipelineError::UnintelligibleAudio) => {
                info!("Audio was unintelligible, asking the user to retry");
                CaptureOutcome::unintelligible()
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = ?e.kind(),
                    transcriber = self.transcriber.name(),
                    llm = self.llm.name(),
                    "Capture failed"
                );
                self.progress
                    .publish(request_id, ProgressKind::from_error(&e));
                return CaptureOutcome::failed(&e);
            }
        };

        self.progress.publish(
            request_id,
            ProgressKind::Complete {
                outcome: outcome.clone(),
            },
        );
        outcome
    }

    async fn capture_stages(
        &self,
        request_id: Uuid,
        user_id: &str,
        audio: &AudioInput,
    ) -> Result<CaptureOutcome, PipelineError> {
        let publish = |kind: ProgressKind| {
            self.progress.publish(request_id, kind);
        };

        publish(ProgressKind::ContextLoading);
        let context = load_context(&self.store, user_id)?;
        publish(ProgressKind::ContextLoaded {
            vocabulary_size: context.vocabulary.len(),
            projects: context.projects.len(),
            people: context.people.len(),
        });

        publish(ProgressKind::TranscriptionStart {
            audio_bytes: audio.len(),
        });
        let transcript = self
            .transcriber
            .transcribe(audio, &context.vocabulary)
            .await?;
        info!(chars = transcript.len(), "Transcription complete");
        publish(ProgressKind::TranscriptionComplete {
            transcript: transcript.clone(),
        });

        let corrections = self
            .store
            .recent_corrections(user_id, self.settings.corrections_window)?;

        publish(ProgressKind::ProcessingStart);
        let today = context.today();
        let extracted = extract_task(
            self.llm.as_ref(),
            &transcript,
            &context,
            &corrections,
            today,
        )
        .await?;

        let new_task = task_from_extraction(
            user_id,
            &transcript,
            &extracted,
            self.settings.review_threshold,
        );
        info!(
            title = %new_task.title,
            status = %new_task.status,
            gravity = new_task.gravity.as_str(),
            "Extraction complete"
        );
        publish(ProgressKind::ProcessingComplete {
            title: new_task.title.clone(),
            status: new_task.status,
        });

        publish(ProgressKind::Saving);
        let task = self.store.insert_task(&new_task)?;
        info!(task_id = task.id, "Task saved");

        Ok(CaptureOutcome::saved(task, transcript))
    }
}

/// Whether an extraction needs a human look before it leaves the inbox.
///
/// A missing confidence does not by itself send a task to review.
pub fn needs_review(extracted: &ExtractedTask, threshold: f64) -> bool {
    extracted.is_ambiguous
        || extracted
            .confidence()
            .map(|c| c < threshold)
            .unwrap_or(false)
}

/// Build the row to store for a capture
pub fn task_from_extraction(
    user_id: &str,
    transcript: &str,
    extracted: &ExtractedTask,
    threshold: f64,
) -> NewTask {
    let review = needs_review(extracted, threshold);

    let mut tags = dedup_preserving_order(extracted.tags.iter().cloned());
    if review && !tags.iter().any(|t| t == NEEDS_SORTING_TAG) {
        tags.push(NEEDS_SORTING_TAG.to_string());
    }

    let title = extracted
        .title
        .clone()
        .unwrap_or_else(|| fallback_title(transcript));

    NewTask {
        user_id: user_id.to_string(),
        content: transcript.to_string(),
        title,
        description: extracted.description.clone(),
        status: if review {
            TaskStatus::InboxReview
        } else {
            TaskStatus::Inbox
        },
        gravity: extracted.gravity(),
        project: extracted.project.clone(),
        due_date: extracted.due_date(),
        tags,
        confidence: extracted.confidence(),
        is_ambiguous: extracted.is_ambiguous,
        parent_task_id: None,
        shard_order: None,
        created_at: Utc::now(),
    }
}

fn fallback_title(transcript: &str) -> String {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    let mut title = words
        .iter()
        .take(FALLBACK_TITLE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > FALLBACK_TITLE_WORDS {
        title.push_str("...");
    }
    title
}
