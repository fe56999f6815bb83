//! Task mutations and queries outside the two pipelines: status changes
//! (where parent completion happens), corrections, bundles and jettison.

use rand::seq::SliceRandom;
use tracing::{info, instrument};

use crate::domain::{
    Correction, EnergyLevel, FieldCorrection, StatusUpdate, Task, TaskId, TaskStatus,
};
use crate::error::{PipelineError, Result};

use super::orchestrator::{require_user, Orchestrator};

impl Orchestrator {
    /// Change a task's status.
    ///
    /// Completing the last open shard of a parent completes the parent in the
    /// same call; `parent_completed` reports it.
    #[instrument(skip(self))]
    pub fn update_task_status(
        &self,
        user_id: &str,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<StatusUpdate> {
        let user_id = require_user(user_id)?;
        let update = self
            .store
            .update_status(user_id, task_id, status)?
            .ok_or_else(|| PipelineError::not_found("task", task_id))?;

        if update.parent_completed {
            info!(parent_task_id = ?update.parent_task_id, "All shards complete, parent completed");
        }
        Ok(update)
    }

    /// Record manual overrides of extracted fields.
    ///
    /// The task's original transcript is stored with each correction so later
    /// extractions can learn from it.
    #[instrument(skip(self, corrections), fields(count = corrections.len()))]
    pub fn record_corrections(
        &self,
        user_id: &str,
        task_id: TaskId,
        corrections: &[FieldCorrection],
    ) -> Result<Vec<Correction>> {
        let user_id = require_user(user_id)?;

        if let Some(bad) = corrections.iter().find(|c| c.field_name.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(format!(
                "correction without a field name: {:?}",
                bad
            )));
        }

        let task = self
            .store
            .get_task(user_id, task_id)?
            .ok_or_else(|| PipelineError::not_found("task", task_id))?;

        let saved = self.store.append_corrections(
            user_id,
            Some(task.id),
            Some(task.content.as_str()),
            corrections,
        )?;
        info!(saved = saved.len(), "Corrections recorded");
        Ok(saved)
    }

    pub fn get_task(&self, user_id: &str, task_id: TaskId) -> Result<Task> {
        let user_id = require_user(user_id)?;
        self.store
            .get_task(user_id, task_id)?
            .ok_or_else(|| PipelineError::not_found("task", task_id))
    }

    pub fn list_tasks(&self, user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let user_id = require_user(user_id)?;
        Ok(self.store.list_tasks(user_id, status)?)
    }

    /// Shards of a task the user owns, in presentation order
    pub fn list_shards(&self, user_id: &str, parent_task_id: TaskId) -> Result<Vec<Task>> {
        let parent = self.get_task(user_id, parent_task_id)?;
        Ok(self.store.list_shards(parent.id)?)
    }

    /// Randomly pick up to `size` open tasks that suit the user's energy.
    ///
    /// Parents that were broken down are left out; their shards are offered
    /// instead. `size` of `None` uses the configured default.
    #[instrument(skip(self))]
    pub fn bundle(
        &self,
        user_id: &str,
        energy: EnergyLevel,
        size: Option<usize>,
    ) -> Result<Vec<Task>> {
        let user_id = require_user(user_id)?;
        let size = size.unwrap_or(self.settings.default_bundle_size);

        let candidates: Vec<Task> = self
            .store
            .open_leaf_tasks(user_id)?
            .into_iter()
            .filter(|t| t.status.is_open() && energy.allows(t.gravity))
            .collect();

        let mut rng = rand::thread_rng();
        let picked: Vec<Task> = candidates
            .choose_multiple(&mut rng, size)
            .cloned()
            .collect();

        info!(candidates = candidates.len(), picked = picked.len(), "Bundle drawn");
        Ok(picked)
    }

    /// Send every unfinished task back to the inbox
    #[instrument(skip(self))]
    pub fn jettison(&self, user_id: &str) -> Result<usize> {
        let user_id = require_user(user_id)?;
        let reset = self.store.reset_open_tasks(user_id)?;
        info!(reset, "Jettisoned open tasks");
        Ok(reset)
    }
}
