//! Personalisation management: the data the context snapshot is built from.

use serde::Deserialize;
use tracing::{info, instrument};

use crate::domain::{KnownPerson, Project, UserProfile};
use crate::error::{PipelineError, Result};
use crate::store::StoreError;

use super::context::{load_context, ContextSnapshot};
use super::orchestrator::{require_user, Orchestrator};

/// Partial profile change; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub timezone: Option<String>,
    pub high_gravity_keywords: Option<Vec<String>>,
    pub low_gravity_keywords: Option<Vec<String>>,
    pub deepgram_keywords: Option<Vec<String>>,
}

fn encode(words: &[String]) -> Result<String> {
    UserProfile::encode_keywords(words)
        .map_err(|e| PipelineError::Storage(StoreError::Serialization(e)))
}

fn required_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PipelineError::InvalidInput(format!("{} name is empty", kind)));
    }
    Ok(name)
}

impl Orchestrator {
    /// Create or patch the user's profile
    #[instrument(skip(self, update))]
    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<UserProfile> {
        let user_id = require_user(user_id)?;
        let mut profile = self
            .store
            .get_profile(user_id)?
            .unwrap_or_else(|| UserProfile::new(user_id));

        if let Some(name) = &update.display_name {
            profile.display_name = Some(name.clone());
        }
        if let Some(tz) = &update.timezone {
            profile.timezone = Some(tz.clone());
        }
        if let Some(words) = &update.high_gravity_keywords {
            profile.high_gravity_keywords = Some(encode(words)?);
        }
        if let Some(words) = &update.low_gravity_keywords {
            profile.low_gravity_keywords = Some(encode(words)?);
        }
        if let Some(words) = &update.deepgram_keywords {
            profile.deepgram_keywords = Some(encode(words)?);
        }

        self.store.upsert_profile(&profile)?;
        info!("Profile updated");
        Ok(profile)
    }

    /// The context the pipelines would use for this user right now
    pub fn context_for(&self, user_id: &str) -> Result<ContextSnapshot> {
        let user_id = require_user(user_id)?;
        Ok(load_context(&self.store, user_id)?)
    }

    pub fn add_project(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project> {
        let user_id = require_user(user_id)?;
        let name = required_name("project", name)?;
        Ok(self.store.add_project(user_id, name, description)?)
    }

    pub fn delete_project(&self, user_id: &str, project_id: i64) -> Result<()> {
        let user_id = require_user(user_id)?;
        if !self.store.delete_project(user_id, project_id)? {
            return Err(PipelineError::not_found("project", project_id));
        }
        Ok(())
    }

    pub fn list_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        let user_id = require_user(user_id)?;
        Ok(self.store.list_projects(user_id)?)
    }

    pub fn add_person(
        &self,
        user_id: &str,
        name: &str,
        context: Option<&str>,
    ) -> Result<KnownPerson> {
        let user_id = require_user(user_id)?;
        let name = required_name("person", name)?;
        Ok(self.store.add_person(user_id, name, context)?)
    }

    pub fn delete_person(&self, user_id: &str, person_id: i64) -> Result<()> {
        let user_id = require_user(user_id)?;
        if !self.store.delete_person(user_id, person_id)? {
            return Err(PipelineError::not_found("person", person_id));
        }
        Ok(())
    }

    pub fn list_people(&self, user_id: &str) -> Result<Vec<KnownPerson>> {
        let user_id = require_user(user_id)?;
        Ok(self.store.list_people(user_id)?)
    }
}
