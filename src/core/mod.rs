//! Core orchestration logic.
//!
//! This module contains:
//! - Context: per-user personalisation snapshot
//! - Capture: audio -> transcript -> extracted task
//! - Breakdown: task -> ordered shards, at most once per task
//! - Progress: registry of staged events per request
//! - Orchestrator: owns storage, adapters and the registry

pub mod breakdown;
pub mod capture;
pub mod context;
pub mod orchestrator;
pub mod profile;
pub mod progress;
pub mod tasks;

// Re-export commonly used types
pub use breakdown::{BreakdownResult, ALREADY_DECOMPOSED_MESSAGE};
pub use capture::{needs_review, task_from_extraction};
pub use context::{load_context, ContextSnapshot};
pub use orchestrator::{Orchestrator, PipelineSettings};
pub use profile::ProfileUpdate;
pub use progress::{ProgressRegistry, ProgressSnapshot, ProgressSubscription};
