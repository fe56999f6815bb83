//! gravity - voice-first task capture and breakdown
//!
//! Captures tasks from voice notes and breaks overwhelming tasks into small
//! ordered shards, using an external speech-to-text provider and an LLM.
//!
//! # Architecture
//!
//! Two pipelines sit behind one [`Orchestrator`]:
//! - Capture: context -> transcription -> extraction -> status decision -> save,
//!   streaming a typed progress event at every stage boundary
//! - Breakdown: context -> decomposition -> shard persistence, at most once
//!   per task
//!
//! Completing the last open shard of a task completes the task itself.
//!
//! # Modules
//!
//! - `adapters`: Provider traits and HTTP clients (Deepgram, Anthropic),
//!   extraction and decomposition prompts, retry policy
//! - `core`: Pipelines, context snapshot, progress registry
//! - `domain`: Data structures (Task, UserProfile, ProgressEvent)
//! - `store`: SQLite persistence
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Capture a task from a voice note
//! gravity --user sam capture note.webm
//!
//! # Break task 12 into shards
//! gravity --user sam breakdown 12
//!
//! # Finish a shard
//! gravity --user sam status 14 complete
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{BreakdownResult, Orchestrator, PipelineSettings, ProgressRegistry};
pub use adapters::{AudioInput, LanguageModel, Transcriber};
pub use domain::{CaptureOutcome, ProgressEvent, ProgressKind, Task, TaskStatus};
pub use error::{ErrorKind, PipelineError};
pub use store::Store;
