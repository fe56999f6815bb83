//! Anthropic Messages API adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::retry::CallPolicy;
use super::LanguageModel;
use crate::error::PipelineError;

pub const SERVICE: &str = "anthropic";

const API_VERSION: &str = "2023-06-01";

/// Connection settings for the LLM provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Read from `ANTHROPIC_API_KEY`; never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub policy: CallPolicy,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
            policy: CallPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks; tool-use and other blocks are ignored
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect()
    }
}

/// HTTP client for the Messages endpoint
pub struct AnthropicClient {
    settings: AnthropicSettings,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(settings: AnthropicSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v1/messages",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn failure(status: Option<u16>, message: String) -> PipelineError {
        PipelineError::ProviderFailure {
            service: SERVICE,
            status,
            message,
        }
    }

    async fn send_once(
        &self,
        api_key: &str,
        system: &str,
        user_message: &str,
    ) -> Result<String, PipelineError> {
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            system,
            messages: [Message {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .client
            .post(self.messages_url())
            .timeout(self.settings.policy.timeout())
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::failure(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| {
            Self::failure(
                Some(status.as_u16()),
                format!("Failed to read response body: {}", e),
            )
        })?;

        if !status.is_success() {
            return Err(Self::failure(Some(status.as_u16()), raw));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|e| PipelineError::MalformedResponse {
                reason: format!("messages envelope: {}", e),
                raw: raw.clone(),
            })?;

        Ok(parsed.text())
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn complete(&self, system: &str, user_message: &str) -> Result<String, PipelineError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(PipelineError::ServiceUnavailable { service: SERVICE })?;

        debug!(
            model = %self.settings.model,
            prompt_chars = user_message.len(),
            "Sending completion request"
        );

        let this = self;
        self.settings
            .policy
            .retry
            .run(self.name(), move || this.send_once(api_key, system, user_message))
            .await
    }
}
