//! Breakdown pipeline: split a task into ordered shards, at most once.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::adapters::{decompose_task, Decomposition};
use crate::domain::{NewTask, Task, TaskId, TaskStatus, SHARD_TAG};
use crate::error::{PipelineError, Result};
use crate::store::ShardInsert;

use super::context::load_context;
use super::orchestrator::{require_user, Orchestrator};

pub const ALREADY_DECOMPOSED_MESSAGE: &str = "Task was already broken down";

/// Result of a breakdown request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownResult {
    pub success: bool,

    /// Shards in presentation order
    pub shards: Vec<Task>,

    /// The model's explanation; empty when the shards already existed
    pub reasoning: String,

    pub parent_task: Task,

    /// True when no new shards were created
    pub already_decomposed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BreakdownResult {
    fn existing(parent_task: Task, shards: Vec<Task>) -> Self {
        Self {
            success: true,
            shards,
            reasoning: String::new(),
            parent_task,
            already_decomposed: true,
            message: Some(ALREADY_DECOMPOSED_MESSAGE.to_string()),
        }
    }
}

impl Orchestrator {
    /// Break a task into shards.
    ///
    /// If the task already has shards they are returned unchanged and the
    /// model is not consulted.
    #[instrument(skip(self))]
    pub async fn submit_breakdown(
        &self,
        parent_task_id: TaskId,
        user_id: &str,
    ) -> Result<BreakdownResult> {
        let user_id = require_user(user_id)?;

        let parent = self
            .store
            .get_task(user_id, parent_task_id)?
            .ok_or_else(|| PipelineError::not_found("task", parent_task_id))?;

        if parent.is_shard() {
            return Err(PipelineError::NestedShard(parent_task_id));
        }

        let existing = self.store.list_shards(parent_task_id)?;
        if !existing.is_empty() {
            info!(shards = existing.len(), "Task already broken down, returning existing shards");
            return Ok(BreakdownResult::existing(parent, existing));
        }

        let context = load_context(&self.store, user_id)?;
        let corrections = self
            .store
            .recent_corrections(user_id, self.settings.corrections_window)?;

        info!(llm = self.llm.name(), "Decomposing task");
        let decomposition = decompose_task(
            self.llm.as_ref(),
            &parent,
            &context,
            &corrections,
            context.today(),
        )
        .await?;

        if decomposition.shards.is_empty() {
            warn!("Model returned no shards");
            return Err(PipelineError::EmptyDecomposition);
        }

        let new_shards = shard_tasks(&parent, &decomposition);

        match self.store.insert_shards(parent_task_id, &new_shards)? {
            ShardInsert::Inserted(shards) => {
                info!(shards = shards.len(), "Task broken down");
                Ok(BreakdownResult {
                    success: true,
                    shards,
                    reasoning: decomposition.reasoning,
                    parent_task: parent,
                    already_decomposed: false,
                    message: None,
                })
            }
            ShardInsert::AlreadyExists(shards) => {
                // Another breakdown of the same task won the race
                info!(shards = shards.len(), "Shards appeared while decomposing, keeping existing set");
                Ok(BreakdownResult::existing(parent, shards))
            }
        }
    }
}

/// Shard rows for a parent, numbered 1.. in the model's order
pub fn shard_tasks(parent: &Task, decomposition: &Decomposition) -> Vec<NewTask> {
    let created_at = Utc::now();

    decomposition
        .shards
        .iter()
        .enumerate()
        .map(|(index, shard)| {
            let order = index as u32 + 1;
            let title = shard
                .title
                .clone()
                .or_else(|| shard.description.clone())
                .unwrap_or_else(|| format!("Step {}", order));

            NewTask {
                user_id: parent.user_id.clone(),
                content: title.clone(),
                title,
                description: shard.description.clone(),
                status: TaskStatus::Inbox,
                gravity: shard.gravity(),
                project: parent.project.clone(),
                due_date: None,
                tags: vec![SHARD_TAG.to_string()],
                confidence: None,
                is_ambiguous: false,
                parent_task_id: Some(parent.id),
                shard_order: Some(order),
                created_at,
            }
        })
        .collect()
}
