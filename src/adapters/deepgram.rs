//! Deepgram speech-to-text adapter.
//!
//! Posts raw audio to `/v1/listen` with the user's vocabulary as repeated
//! `keywords` hints and reads the first alternative of the first channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::retry::CallPolicy;
use super::{AudioInput, Transcriber};
use crate::error::PipelineError;

pub const SERVICE: &str = "deepgram";

/// Connection settings for the transcription provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepgramSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Read from `DEEPGRAM_API_KEY`; never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub policy: CallPolicy,
}

fn default_base_url() -> String {
    "https://api.deepgram.com".to_string()
}

fn default_model() -> String {
    "nova-2".to_string()
}

impl Default for DeepgramSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            policy: CallPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    results: Option<ListenResults>,
}

#[derive(Debug, Default, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Default, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Default, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

impl ListenResponse {
    fn transcript(self) -> Option<String> {
        self.results?
            .channels
            .into_iter()
            .next()?
            .alternatives
            .into_iter()
            .next()
            .map(|a| a.transcript)
    }
}

/// HTTP client for Deepgram's pre-recorded audio endpoint
pub struct DeepgramClient {
    settings: DeepgramSettings,
    client: reqwest::Client,
}

impl DeepgramClient {
    pub fn new(settings: DeepgramSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn listen_url(&self) -> String {
        format!("{}/v1/listen", self.settings.base_url.trim_end_matches('/'))
    }

    /// One request, no retries
    async fn listen_once(
        &self,
        api_key: &str,
        audio: &AudioInput,
        vocabulary: &[String],
    ) -> Result<String, PipelineError> {
        let mut request = self
            .client
            .post(self.listen_url())
            .timeout(self.settings.policy.timeout())
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", api_key))
            .header(reqwest::header::CONTENT_TYPE, audio.mime_type.as_str())
            .query(&[
                ("model", self.settings.model.as_str()),
                ("smart_format", "true"),
            ]);

        if !vocabulary.is_empty() {
            let hints: Vec<(&str, &str)> = vocabulary
                .iter()
                .map(|word| ("keywords", word.as_str()))
                .collect();
            request = request.query(&hints);
        }

        let response = request
            .body(audio.bytes.clone())
            .send()
            .await
            .map_err(|e| PipelineError::TranscriptionFailed {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::TranscriptionFailed {
                status: Some(status.as_u16()),
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(PipelineError::TranscriptionFailed {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let parsed: ListenResponse =
            serde_json::from_str(&body).map_err(|e| PipelineError::MalformedResponse {
                reason: format!("transcription response: {}", e),
                raw: body.clone(),
            })?;

        Ok(parsed.transcript().unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for DeepgramClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn transcribe(
        &self,
        audio: &AudioInput,
        vocabulary: &[String],
    ) -> Result<String, PipelineError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(PipelineError::ServiceUnavailable { service: SERVICE })?;

        debug!(
            audio_bytes = audio.len(),
            hints = vocabulary.len(),
            model = %self.settings.model,
            "Sending audio for transcription"
        );

        let this = self;
        let transcript = self
            .settings
            .policy
            .retry
            .run(self.name(), move || this.listen_once(api_key, audio, vocabulary))
            .await?;

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            info!("Transcription came back empty");
            return Err(PipelineError::UnintelligibleAudio);
        }

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_path() {
        let parsed: ListenResponse = serde_json::from_str(
            r#"{"results":{"channels":[{"alternatives":[{"transcript":"call mum","confidence":0.9}]}]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.transcript().as_deref(), Some("call mum"));
    }

    #[test]
    fn test_missing_channels_is_none() {
        let parsed: ListenResponse = serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(parsed.transcript(), None);
    }

    #[tokio::test]
    async fn test_missing_key_is_service_unavailable() {
        let client = DeepgramClient::new(DeepgramSettings::default());
        let audio = AudioInput::new(vec![1, 2, 3], "audio/webm");

        let err = client.transcribe(&audio, &[]).await.unwrap_err();
        match err {
            PipelineError::ServiceUnavailable { service } => assert_eq!(service, client.name()),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
