//! Task rows: insertion, shard bookkeeping and status transitions.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Store, StoreError};
use crate::domain::{Gravity, NewTask, StatusUpdate, Task, TaskId, TaskStatus};

const TASK_COLUMNS: &str = "id, user_id, content, title, description, status, gravity, project,
     due_date, tags, confidence, is_ambiguous, parent_task_id, shard_order, created_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of a shard batch insert
#[derive(Debug, Clone)]
pub enum ShardInsert {
    /// The shards were written, in order
    Inserted(Vec<Task>),

    /// The parent already had shards; nothing was written
    AlreadyExists(Vec<Task>),
}

/// A task row as stored, before enum/JSON decoding
struct RawTask {
    id: i64,
    user_id: String,
    content: String,
    title: String,
    description: Option<String>,
    status: String,
    gravity: String,
    project: Option<String>,
    due_date: Option<String>,
    tags: String,
    confidence: Option<f64>,
    is_ambiguous: bool,
    parent_task_id: Option<i64>,
    shard_order: Option<u32>,
    created_at: String,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            gravity: row.get(6)?,
            project: row.get(7)?,
            due_date: row.get(8)?,
            tags: row.get(9)?,
            confidence: row.get(10)?,
            is_ambiguous: row.get(11)?,
            parent_task_id: row.get(12)?,
            shard_order: row.get(13)?,
            created_at: row.get(14)?,
        })
    }

    fn into_task(self) -> Result<Task, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "tasks",
            reason,
        };

        let status = self.status.parse::<TaskStatus>().map_err(corrupt)?;
        let gravity = self.gravity.parse::<Gravity>().map_err(corrupt)?;
        let due_date = self
            .due_date
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                    .map_err(|e| corrupt(format!("bad due date '{}': {}", raw, e)))
            })
            .transpose()?;

        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            title: self.title,
            description: self.description,
            status,
            gravity,
            project: self.project,
            due_date,
            tags: serde_json::from_str(&self.tags)?,
            confidence: self.confidence,
            is_ambiguous: self.is_ambiguous,
            parent_task_id: self.parent_task_id,
            shard_order: self.shard_order,
            created_at: parse_timestamp("tasks", &self.created_at)?,
        })
    }
}

fn insert_task_with(conn: &Connection, task: &NewTask) -> Result<Task, StoreError> {
    let created_at = format_timestamp(&task.created_at);
    conn.execute(
        "INSERT INTO tasks (user_id, content, title, description, status, gravity, project,
             due_date, tags, confidence, is_ambiguous, parent_task_id, shard_order, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            task.user_id,
            task.content,
            task.title,
            task.description,
            task.status.as_str(),
            task.gravity.as_str(),
            task.project,
            task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
            serde_json::to_string(&task.tags)?,
            task.confidence,
            task.is_ambiguous,
            task.parent_task_id,
            task.shard_order,
            created_at,
        ],
    )?;

    Ok(Task {
        id: conn.last_insert_rowid(),
        user_id: task.user_id.clone(),
        content: task.content.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status,
        gravity: task.gravity,
        project: task.project.clone(),
        due_date: task.due_date,
        tags: task.tags.clone(),
        confidence: task.confidence,
        is_ambiguous: task.is_ambiguous,
        parent_task_id: task.parent_task_id,
        shard_order: task.shard_order,
        // Read back through the stored format so the value matches a later fetch.
        created_at: parse_timestamp("tasks", &created_at)?,
    })
}

fn query_tasks(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, RawTask::from_row)?;

    let mut tasks = Vec::new();
    for raw in rows {
        tasks.push(raw?.into_task()?);
    }
    Ok(tasks)
}

fn shards_of(conn: &Connection, parent_id: TaskId) -> Result<Vec<Task>, StoreError> {
    query_tasks(
        conn,
        &format!(
            "SELECT {} FROM tasks WHERE parent_task_id = ?1 ORDER BY shard_order, id",
            TASK_COLUMNS
        ),
        params![parent_id],
    )
}

fn find_task(conn: &Connection, user_id: &str, id: TaskId) -> Result<Option<Task>, StoreError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2",
                TASK_COLUMNS
            ),
            params![id, user_id],
            RawTask::from_row,
        )
        .optional()?;
    raw.map(RawTask::into_task).transpose()
}

impl Store {
    /// Insert a task and return it with its generated id
    pub fn insert_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        let conn = self.lock()?;
        insert_task_with(&conn, task)
    }

    /// Fetch a task owned by the user
    pub fn get_task(&self, user_id: &str, id: TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        find_task(&conn, user_id, id)
    }

    /// Newest first, optionally filtered by status
    pub fn list_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        match status {
            Some(status) => query_tasks(
                &conn,
                &format!(
                    "SELECT {} FROM tasks WHERE user_id = ?1 AND status = ?2
                     ORDER BY created_at DESC, id DESC",
                    TASK_COLUMNS
                ),
                params![user_id, status.as_str()],
            ),
            None => query_tasks(
                &conn,
                &format!(
                    "SELECT {} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                    TASK_COLUMNS
                ),
                params![user_id],
            ),
        }
    }

    /// Shards of a parent in presentation order
    pub fn list_shards(&self, parent_id: TaskId) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        shards_of(&conn, parent_id)
    }

    /// Write a parent's shards in one transaction.
    ///
    /// Existing shards are checked again inside the transaction, so a parent
    /// never ends up with two shard sets.
    pub fn insert_shards(
        &self,
        parent_id: TaskId,
        shards: &[NewTask],
    ) -> Result<ShardInsert, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing = shards_of(&tx, parent_id)?;
        if !existing.is_empty() {
            return Ok(ShardInsert::AlreadyExists(existing));
        }

        let mut inserted = Vec::with_capacity(shards.len());
        for shard in shards {
            inserted.push(insert_task_with(&tx, shard)?);
        }

        tx.commit()?;
        Ok(ShardInsert::Inserted(inserted))
    }

    /// Change a task's status, completing its parent when this was the last
    /// open shard.
    ///
    /// The parent is moved with a compare-and-set, so `parent_completed` is
    /// true for exactly one call even if two shards finish at once.
    pub fn update_status(
        &self,
        user_id: &str,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Option<StatusUpdate>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(mut task) = find_task(&tx, user_id, id)? else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        task.status = status;

        let mut parent_completed = false;
        if status == TaskStatus::Complete {
            if let Some(parent_id) = task.parent_task_id {
                let siblings = shards_of(&tx, parent_id)?;
                if siblings.iter().all(|s| s.status == TaskStatus::Complete) {
                    let changed = tx.execute(
                        "UPDATE tasks SET status = ?1 WHERE id = ?2 AND status != ?1",
                        params![TaskStatus::Complete.as_str(), parent_id],
                    )?;
                    parent_completed = changed == 1;
                }
            }
        }

        tx.commit()?;

        Ok(Some(StatusUpdate {
            parent_task_id: task.parent_task_id,
            task,
            parent_completed,
        }))
    }

    /// Open tasks that have no shards of their own
    pub fn open_leaf_tasks(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        query_tasks(
            &conn,
            &format!(
                "SELECT {} FROM tasks
                 WHERE user_id = ?1 AND status != ?2
                   AND id NOT IN (SELECT parent_task_id FROM tasks WHERE parent_task_id IS NOT NULL)
                 ORDER BY id",
                TASK_COLUMNS
            ),
            params![user_id, TaskStatus::Complete.as_str()],
        )
    }

    /// Move every non-complete task of the user back to the inbox
    pub fn reset_open_tasks(&self, user_id: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE user_id = ?2 AND status NOT IN (?1, ?3)",
            params![
                TaskStatus::Inbox.as_str(),
                user_id,
                TaskStatus::Complete.as_str()
            ],
        )?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SHARD_TAG;

    fn shards_for(parent: &Task, titles: &[&str]) -> Vec<NewTask> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let mut task = NewTask::inbox(&parent.user_id, *title);
                task.tags = vec![SHARD_TAG.to_string()];
                task.parent_task_id = Some(parent.id);
                task.shard_order = Some(i as u32 + 1);
                task
            })
            .collect()
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut new = NewTask::inbox("sam", "file taxes by friday");
        new.title = "File taxes".into();
        new.gravity = Gravity::High;
        new.due_date = NaiveDate::from_ymd_opt(2026, 4, 15);
        new.tags = vec!["money".into(), "admin".into()];
        new.confidence = Some(0.92);

        let saved = store.insert_task(&new).unwrap();
        let loaded = store.get_task("sam", saved.id).unwrap().unwrap();

        assert_eq!(loaded.title, "File taxes");
        assert_eq!(loaded.content, "file taxes by friday");
        assert_eq!(loaded.gravity, Gravity::High);
        assert_eq!(loaded.due_date, NaiveDate::from_ymd_opt(2026, 4, 15));
        assert_eq!(loaded.tags, vec!["money", "admin"]);
        assert_eq!(loaded.confidence, Some(0.92));

        assert!(store.get_task("alex", saved.id).unwrap().is_none());
    }

    #[test]
    fn test_insert_shards_is_once_only() {
        let store = Store::open_in_memory().unwrap();
        let parent = store.insert_task(&NewTask::inbox("sam", "clean house")).unwrap();

        let batch = shards_for(&parent, &["kitchen", "bath"]);
        let first = store.insert_shards(parent.id, &batch).unwrap();
        let second = store.insert_shards(parent.id, &batch).unwrap();

        let ShardInsert::Inserted(inserted) = first else {
            panic!("first insert should write shards");
        };
        let ShardInsert::AlreadyExists(existing) = second else {
            panic!("second insert should be refused");
        };
        assert_eq!(inserted, existing);
        assert_eq!(store.list_shards(parent.id).unwrap().len(), 2);
    }

    #[test]
    fn test_last_shard_completes_parent_exactly_once() {
        let store = Store::open_in_memory().unwrap();
        let parent = store.insert_task(&NewTask::inbox("sam", "clean house")).unwrap();
        let batch = shards_for(&parent, &["kitchen", "bath"]);
        let ShardInsert::Inserted(shards) = store.insert_shards(parent.id, &batch).unwrap() else {
            panic!("expected insert");
        };

        let first = store
            .update_status("sam", shards[0].id, TaskStatus::Complete)
            .unwrap()
            .unwrap();
        assert!(!first.parent_completed);
        assert_eq!(
            store.get_task("sam", parent.id).unwrap().unwrap().status,
            TaskStatus::Inbox
        );

        let last = store
            .update_status("sam", shards[1].id, TaskStatus::Complete)
            .unwrap()
            .unwrap();
        assert!(last.parent_completed);
        assert_eq!(last.parent_task_id, Some(parent.id));
        assert_eq!(
            store.get_task("sam", parent.id).unwrap().unwrap().status,
            TaskStatus::Complete
        );

        // Completing an already complete shard again does not re-fire.
        let again = store
            .update_status("sam", shards[1].id, TaskStatus::Complete)
            .unwrap()
            .unwrap();
        assert!(!again.parent_completed);
    }

    #[test]
    fn test_open_leaf_tasks_skip_broken_down_parents() {
        let store = Store::open_in_memory().unwrap();
        let parent = store.insert_task(&NewTask::inbox("sam", "move flat")).unwrap();
        let lone = store.insert_task(&NewTask::inbox("sam", "water plants")).unwrap();
        let batch = shards_for(&parent, &["book van"]);
        store.insert_shards(parent.id, &batch).unwrap();

        let ids: Vec<TaskId> = store
            .open_leaf_tasks("sam")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert!(ids.contains(&lone.id));
        assert!(!ids.contains(&parent.id));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_reset_open_tasks_leaves_complete_alone() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_task(&NewTask::inbox("sam", "a")).unwrap();
        let b = store.insert_task(&NewTask::inbox("sam", "b")).unwrap();
        store.update_status("sam", a.id, TaskStatus::Active).unwrap();
        store.update_status("sam", b.id, TaskStatus::Complete).unwrap();

        assert_eq!(store.reset_open_tasks("sam").unwrap(), 1);
        assert_eq!(
            store.get_task("sam", a.id).unwrap().unwrap().status,
            TaskStatus::Inbox
        );
        assert_eq!(
            store.get_task("sam", b.id).unwrap().unwrap().status,
            TaskStatus::Complete
        );
    }
}
