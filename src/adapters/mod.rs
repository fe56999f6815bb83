//! Adapter interfaces for external providers.
//!
//! Pipelines talk to speech-to-text and LLM services only through the
//! [`Transcriber`] and [`LanguageModel`] traits, so any implementation
//! (HTTP client, scripted fake) can drive them.

pub mod anthropic;
pub mod decomposition;
pub mod deepgram;
pub mod extraction;
pub mod prompt;
pub mod retry;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use anthropic::{AnthropicClient, AnthropicSettings};
pub use decomposition::{decompose_task, Decomposition, ShardDescriptor};
pub use deepgram::{DeepgramClient, DeepgramSettings};
pub use extraction::{extract_task, ExtractedTask};
pub use retry::{CallPolicy, RetryPolicy};

/// Raw audio handed to a transcriber
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,

    /// MIME type sent as the request content type
    pub mime_type: String,
}

impl AudioInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Guess the MIME type from a file extension, defaulting to webm
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => "audio/wav",
            "mp3" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            "ogg" | "oga" => "audio/ogg",
            "flac" => "audio/flac",
            _ => "audio/webm",
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Speech-to-text provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Transcribe audio, biased towards `vocabulary`.
    ///
    /// An empty or whitespace-only transcript is reported as
    /// [`PipelineError::UnintelligibleAudio`].
    async fn transcribe(
        &self,
        audio: &AudioInput,
        vocabulary: &[String],
    ) -> Result<String, PipelineError>;
}

/// Text completion provider
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Send one system instruction and one user message, returning the raw text reply
    async fn complete(&self, system: &str, user_message: &str) -> Result<String, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(AudioInput::mime_for_extension("WAV"), "audio/wav");
        assert_eq!(AudioInput::mime_for_extension("m4a"), "audio/mp4");
        assert_eq!(AudioInput::mime_for_extension("weird"), "audio/webm");
    }
}
