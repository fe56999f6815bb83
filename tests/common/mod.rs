//! Scripted provider fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use gravity::adapters::{AudioInput, LanguageModel, Transcriber};
use gravity::core::{Orchestrator, ProgressRegistry};
use gravity::error::PipelineError;
use gravity::store::Store;

pub const USER: &str = "sam";

/// Transcriber that replays queued results and records what it was asked
#[derive(Default)]
pub struct ScriptedTranscriber {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    vocabularies: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTranscriber {
    pub fn new(replies: Vec<Result<String, PipelineError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            vocabularies: Mutex::new(Vec::new()),
        })
    }

    pub fn saying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn failing(error: PipelineError) -> Arc<Self> {
        Self::new(vec![Err(error)])
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.vocabularies.lock().unwrap().len()
    }

    pub fn vocabulary(&self, call: usize) -> Vec<String> {
        self.vocabularies.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn transcribe(
        &self,
        _audio: &AudioInput,
        vocabulary: &[String],
    ) -> Result<String, PipelineError> {
        self.vocabularies.lock().unwrap().push(vocabulary.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::InvalidInput("no scripted transcript left".into())))
    }
}

/// Language model that replays queued replies and records the prompts
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, PipelineError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying<S: AsRef<str>>(replies: &[S]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.as_ref().to_string())).collect())
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn user_message(&self, call: usize) -> String {
        self.prompts.lock().unwrap()[call].1.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, user_message: &str) -> Result<String, PipelineError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user_message.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::InvalidInput("no scripted reply left".into())))
    }
}

pub fn orchestrator(
    transcriber: Arc<ScriptedTranscriber>,
    llm: Arc<ScriptedModel>,
) -> Orchestrator {
    let store = Store::open_in_memory().unwrap();
    Orchestrator::new(store, transcriber, llm, ProgressRegistry::default())
}

pub fn audio() -> AudioInput {
    AudioInput::new(vec![0u8; 64], "audio/webm")
}

/// An extraction reply as the model would send it, fenced
pub fn extraction_reply(title: &str, project: Option<&str>, confidence: f64, ambiguous: bool) -> String {
    let body = json!({
        "title": title,
        "description": null,
        "gravity": "Standard",
        "project": project,
        "due_date": null,
        "tags": ["errand"],
        "project_confidence": confidence,
        "is_ambiguous": ambiguous
    });
    format!("```json\n{}\n```", body)
}

pub fn decomposition_reply(titles: &[&str]) -> String {
    let shards: Vec<_> = titles
        .iter()
        .map(|t| json!({"title": t, "description": format!("Do: {}", t), "gravity": "Low", "estimated_minutes": 10}))
        .collect();
    json!({"shards": shards, "reasoning": "smallest first"}).to_string()
}
