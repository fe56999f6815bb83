//! Domain types for the gravity pipelines.
//!
//! This module contains the core data structures:
//! - Task: captured tasks and shards
//! - Profile: personalisation state and corrections
//! - Progress: staged events streamed while a capture runs

pub mod profile;
pub mod progress;
pub mod task;

// Re-export commonly used types
pub use profile::{Correction, FieldCorrection, KnownPerson, Project, UserProfile};
pub use progress::{CaptureOutcome, ProgressEvent, ProgressKind, ProgressStage};
pub use task::{
    EnergyLevel, Gravity, NewTask, StatusUpdate, Task, TaskId, TaskStatus, NEEDS_SORTING_TAG,
    SHARD_TAG,
};
