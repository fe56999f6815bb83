//! SQLite-backed storage for tasks, profiles and corrections.
//!
//! One `Store` wraps a single connection behind a mutex; clones share it.
//! Writes that must be atomic (shard insertion, parent completion, correction
//! batches) run inside a transaction.

mod schema;
mod tasks;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::domain::{Correction, FieldCorrection, KnownPerson, Project, UserProfile};

pub use tasks::ShardInsert;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Handle to the application database
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (and create if needed) a database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT user_id, display_name, high_gravity_keywords, low_gravity_keywords,
                        deepgram_keywords, timezone, created_at, updated_at
                 FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(user_id, display_name, high, low, vocab, timezone, created, updated)| {
                Ok(UserProfile {
                    user_id,
                    display_name,
                    high_gravity_keywords: high,
                    low_gravity_keywords: low,
                    deepgram_keywords: vocab,
                    timezone,
                    created_at: parse_timestamp("user_profiles", &created)?,
                    updated_at: parse_timestamp("user_profiles", &updated)?,
                })
            },
        )
        .transpose()
    }

    /// Insert or replace a profile, keeping its original creation time
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_profiles (user_id, display_name, high_gravity_keywords,
                 low_gravity_keywords, deepgram_keywords, timezone, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 high_gravity_keywords = excluded.high_gravity_keywords,
                 low_gravity_keywords = excluded.low_gravity_keywords,
                 deepgram_keywords = excluded.deepgram_keywords,
                 timezone = excluded.timezone,
                 updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.display_name,
                profile.high_gravity_keywords,
                profile.low_gravity_keywords,
                profile.deepgram_keywords,
                profile.timezone,
                format_timestamp(&profile.created_at),
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Projects and people
    // ------------------------------------------------------------------

    pub fn add_project(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO projects (user_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, description, format_timestamp(&Utc::now())],
        )?;
        Ok(Project {
            id: conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    /// Delete a project owned by the user. Returns false if there was none.
    pub fn delete_project(&self, user_id: &str, project_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM projects WHERE id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn list_projects(&self, user_id: &str) -> Result<Vec<Project>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, description FROM projects WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Project {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn add_person(
        &self,
        user_id: &str,
        name: &str,
        context: Option<&str>,
    ) -> Result<KnownPerson, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO known_people (user_id, name, context, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, context, format_timestamp(&Utc::now())],
        )?;
        Ok(KnownPerson {
            id: conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            context: context.map(str::to_string),
        })
    }

    pub fn delete_person(&self, user_id: &str, person_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM known_people WHERE id = ?1 AND user_id = ?2",
            params![person_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn list_people(&self, user_id: &str) -> Result<Vec<KnownPerson>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, context FROM known_people WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(KnownPerson {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                context: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Corrections (append-only)
    // ------------------------------------------------------------------

    /// Append a batch of corrections atomically
    pub fn append_corrections(
        &self,
        user_id: &str,
        task_id: Option<i64>,
        transcript: Option<&str>,
        corrections: &[FieldCorrection],
    ) -> Result<Vec<Correction>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created_at = Utc::now();
        let mut saved = Vec::with_capacity(corrections.len());

        for correction in corrections {
            tx.execute(
                "INSERT INTO corrections (user_id, task_id, field_name, original_value,
                     corrected_value, transcript, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user_id,
                    task_id,
                    correction.field_name,
                    correction.original_value,
                    correction.corrected_value,
                    transcript,
                    format_timestamp(&created_at),
                ],
            )?;
            saved.push(Correction {
                id: tx.last_insert_rowid(),
                user_id: user_id.to_string(),
                task_id,
                field_name: correction.field_name.clone(),
                original_value: correction.original_value.clone(),
                corrected_value: correction.corrected_value.clone(),
                transcript: transcript.map(str::to_string),
                created_at,
            });
        }

        tx.commit()?;
        Ok(saved)
    }

    /// Most recent corrections first
    pub fn recent_corrections(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Correction>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, task_id, field_name, original_value, corrected_value,
                    transcript, created_at
             FROM corrections WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut corrections = Vec::new();
        for row in rows {
            let (id, user_id, task_id, field_name, original, corrected, transcript, created) =
                row?;
            corrections.push(Correction {
                id,
                user_id,
                task_id,
                field_name,
                original_value: original,
                corrected_value: corrected,
                transcript,
                created_at: parse_timestamp("corrections", &created)?,
            });
        }
        Ok(corrections)
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}
