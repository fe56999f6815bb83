//! Command-line interface for gravity.
//!
//! Provides commands for capturing voice notes, breaking tasks down,
//! updating status, drawing bundles and managing personalisation data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{AnthropicClient, AudioInput, DeepgramClient};
use crate::config;
use crate::core::{Orchestrator, ProfileUpdate, ProgressRegistry};
use crate::domain::{
    CaptureOutcome, EnergyLevel, FieldCorrection, ProgressKind, Task, TaskId, TaskStatus,
};
use crate::store::Store;

/// gravity - voice-first task capture for people who find planning hard
#[derive(Parser, Debug)]
#[command(name = "gravity")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// User to act as
    #[arg(short, long, global = true, env = "GRAVITY_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a task from an audio file
    Capture {
        /// Audio file to transcribe
        file: PathBuf,

        /// MIME type (guessed from the extension if not given)
        #[arg(long)]
        mime: Option<String>,

        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Break a task into smaller shards
    Breakdown {
        task_id: TaskId,
    },

    /// Change a task's status (inbox, inbox_review, active, complete)
    Status {
        task_id: TaskId,
        status: TaskStatus,
    },

    /// Correct one extracted field of a task
    Correct {
        task_id: TaskId,

        /// Field name (title, gravity, project, due_date, ...)
        #[arg(long)]
        field: String,

        /// Value the model produced
        #[arg(long)]
        from: Option<String>,

        /// Value it should have been
        #[arg(long)]
        to: Option<String>,
    },

    /// List tasks
    Tasks {
        /// Filter by status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// List the shards of this task instead
        #[arg(long)]
        shards_of: Option<TaskId>,
    },

    /// Show one task in full
    Show {
        task_id: TaskId,
    },

    /// Draw a few tasks that fit your energy level
    Bundle {
        /// low, medium or high
        #[arg(short, long)]
        energy: EnergyLevel,

        /// Number of tasks (config default if not given)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Send every unfinished task back to the inbox
    Jettison,

    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Manage known people
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },

    /// Show or update your profile
    Profile {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        timezone: Option<String>,

        /// High-gravity keywords (comma-separated, replaces the list)
        #[arg(long)]
        high: Option<String>,

        /// Low-gravity keywords (comma-separated, replaces the list)
        #[arg(long)]
        low: Option<String>,

        /// Transcription vocabulary (comma-separated, replaces the list)
        #[arg(long)]
        vocabulary: Option<String>,
    },

    /// Show the context the pipelines would use
    Context,

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Add a project
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Remove a project by id
    Rm { id: i64 },
    /// List projects
    List,
}

#[derive(Subcommand, Debug)]
pub enum PersonCommands {
    /// Add a person
    Add {
        name: String,
        /// Who they are to you ("manager", "sister")
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Remove a person by id
    Rm { id: i64 },
    /// List people
    List,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let user = self.user.unwrap_or_default();

        match self.command {
            Commands::Config => show_config(),
            Commands::Capture { file, mime, json } => {
                capture(&build_orchestrator()?, &user, &file, mime, json).await
            }
            Commands::Breakdown { task_id } => {
                breakdown(&build_orchestrator()?, &user, task_id).await
            }
            Commands::Status { task_id, status } => {
                let update = build_orchestrator()?.update_task_status(&user, task_id, status)?;
                println!("Task {} is now {}", update.task.id, update.task.status);
                if update.parent_completed {
                    if let Some(parent) = update.parent_task_id {
                        println!("All shards done: task {} completed", parent);
                    }
                }
                Ok(())
            }
            Commands::Correct {
                task_id,
                field,
                from,
                to,
            } => {
                let saved = build_orchestrator()?.record_corrections(
                    &user,
                    task_id,
                    &[FieldCorrection::new(field, from, to)],
                )?;
                println!("Recorded {} correction(s) for task {}", saved.len(), task_id);
                Ok(())
            }
            Commands::Tasks { status, shards_of } => {
                let orchestrator = build_orchestrator()?;
                let tasks = match shards_of {
                    Some(parent) => orchestrator.list_shards(&user, parent)?,
                    None => orchestrator.list_tasks(&user, status)?,
                };
                print_tasks(&tasks);
                Ok(())
            }
            Commands::Show { task_id } => {
                let task = build_orchestrator()?.get_task(&user, task_id)?;
                println!("{}", serde_json::to_string_pretty(&task)?);
                Ok(())
            }
            Commands::Bundle { energy, size } => {
                let tasks = build_orchestrator()?.bundle(&user, energy, size)?;
                if tasks.is_empty() {
                    println!("Nothing fits that energy level right now.");
                } else {
                    print_tasks(&tasks);
                }
                Ok(())
            }
            Commands::Jettison => {
                let reset = build_orchestrator()?.jettison(&user)?;
                println!("Moved {} task(s) back to the inbox", reset);
                Ok(())
            }
            Commands::Project { command } => project(&build_orchestrator()?, &user, command),
            Commands::Person { command } => person(&build_orchestrator()?, &user, command),
            Commands::Profile {
                name,
                timezone,
                high,
                low,
                vocabulary,
            } => {
                let update = ProfileUpdate {
                    display_name: name,
                    timezone,
                    high_gravity_keywords: high.as_deref().map(split_list),
                    low_gravity_keywords: low.as_deref().map(split_list),
                    deepgram_keywords: vocabulary.as_deref().map(split_list),
                };
                profile(&build_orchestrator()?, &user, &update)
            }
            Commands::Context => {
                let context = build_orchestrator()?.context_for(&user)?;
                println!("{}", serde_json::to_string_pretty(&context)?);
                println!("vocabulary: {}", context.vocabulary.join(", "));
                Ok(())
            }
        }
    }
}

/// Wire storage, providers and the progress registry from configuration
fn build_orchestrator() -> Result<Orchestrator> {
    orchestrator_from(config::config()?)
}

fn orchestrator_from(cfg: &config::ResolvedConfig) -> Result<Orchestrator> {
    let store = Store::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))?;
    let transcriber = Arc::new(DeepgramClient::new(cfg.transcription.clone()));
    let llm = Arc::new(AnthropicClient::new(cfg.llm.clone()));
    let progress = ProgressRegistry::new(cfg.progress.grace_period());

    Ok(Orchestrator::new(store, transcriber, llm, progress).with_settings(cfg.pipeline.clone()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn read_audio(path: &Path, mime: Option<String>) -> Result<AudioInput> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read audio file: {}", path.display()))?;

    let mime = mime.unwrap_or_else(|| {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        AudioInput::mime_for_extension(ext).to_string()
    });

    Ok(AudioInput::new(bytes, mime))
}

/// Submit a capture and follow its progress stream to the end
async fn capture(
    orchestrator: &Orchestrator,
    user: &str,
    file: &Path,
    mime: Option<String>,
    json: bool,
) -> Result<()> {
    let audio = read_audio(file, mime)?;
    let request_id = orchestrator.submit_capture(audio, user)?;

    let mut subscription = orchestrator
        .progress()
        .subscribe(request_id)
        .context("Capture request vanished before it could be followed")?;

    let mut outcome: Option<CaptureOutcome> = None;
    while let Some(event) = subscription.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            eprintln!("[{:>2}] {:?}", event.sequence, event.stage());
        }

        match event.kind {
            ProgressKind::Complete { outcome: done } => outcome = Some(done),
            ProgressKind::Error { message, kind } => {
                anyhow::bail!("Capture failed ({:?}): {}", kind, message);
            }
            _ => {}
        }
    }

    let outcome = outcome.context("Progress stream ended without a result")?;
    if json {
        return Ok(());
    }

    match (&outcome.task, outcome.is_unintelligible) {
        (Some(task), _) => {
            println!("Captured task {}: {}", task.id, task.title);
            println!("  Status:  {}", task.status);
            println!("  Gravity: {}", task.gravity);
            if let Some(project) = &task.project {
                println!("  Project: {}", project);
            }
            if let Some(due) = task.due_date {
                println!("  Due:     {}", due);
            }
            if let Some(transcript) = &outcome.transcript {
                println!("  Heard:   \"{}\"", transcript);
            }
        }
        (None, true) => println!("Couldn't make out any words. Try recording again."),
        (None, false) => println!(
            "Capture failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    }
    Ok(())
}

async fn breakdown(orchestrator: &Orchestrator, user: &str, task_id: TaskId) -> Result<()> {
    let result = orchestrator.submit_breakdown(task_id, user).await?;

    if let Some(message) = &result.message {
        println!("{}", message);
    }
    println!("{}", result.parent_task.title);
    for shard in &result.shards {
        println!(
            "  {}. {} [{}] (#{})",
            shard.shard_order.unwrap_or_default(),
            shard.title,
            shard.gravity,
            shard.id
        );
    }
    if !result.reasoning.is_empty() {
        println!("\n{}", result.reasoning);
    }
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks found");
        return;
    }

    println!("{:<6} {:<13} {:<9} {:<14} {}", "ID", "STATUS", "GRAVITY", "PROJECT", "TITLE");
    println!("{}", "-".repeat(80));
    for task in tasks {
        let title = match task.shard_order {
            Some(order) => format!("  {}. {}", order, task.title),
            None => task.title.clone(),
        };
        println!(
            "{:<6} {:<13} {:<9} {:<14} {}",
            task.id,
            task.status.as_str(),
            task.gravity.as_str(),
            task.project.as_deref().unwrap_or("-"),
            title
        );
    }
}

fn project(orchestrator: &Orchestrator, user: &str, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Add { name, description } => {
            let project = orchestrator.add_project(user, &name, description.as_deref())?;
            println!("Added project {} ({})", project.name, project.id);
        }
        ProjectCommands::Rm { id } => {
            orchestrator.delete_project(user, id)?;
            println!("Removed project {}", id);
        }
        ProjectCommands::List => {
            for project in orchestrator.list_projects(user)? {
                println!(
                    "{:<6} {:<20} {}",
                    project.id,
                    project.name,
                    project.description.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn person(orchestrator: &Orchestrator, user: &str, command: PersonCommands) -> Result<()> {
    match command {
        PersonCommands::Add { name, context } => {
            let person = orchestrator.add_person(user, &name, context.as_deref())?;
            println!("Added {} ({})", person.name, person.id);
        }
        PersonCommands::Rm { id } => {
            orchestrator.delete_person(user, id)?;
            println!("Removed person {}", id);
        }
        PersonCommands::List => {
            for person in orchestrator.list_people(user)? {
                println!(
                    "{:<6} {:<20} {}",
                    person.id,
                    person.name,
                    person.context.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn profile(orchestrator: &Orchestrator, user: &str, update: &ProfileUpdate) -> Result<()> {
    let profile = if *update == ProfileUpdate::default() {
        orchestrator
            .store()
            .get_profile(user)?
            .with_context(|| format!("No profile for '{}' yet", user))?
    } else {
        orchestrator.update_profile(user, update)?
    };

    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Gravity Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!("Database:    {}", cfg.database.display());
    println!();
    println!("Transcription: {} ({})", cfg.transcription.base_url, cfg.transcription.model);
    println!("  API key:     {}", key_state(cfg.transcription.api_key.as_deref()));
    println!("  Timeout:     {}s", cfg.transcription.policy.timeout_seconds);
    println!("  Attempts:    {}", cfg.transcription.policy.retry.max_attempts);
    println!("LLM: {} ({})", cfg.llm.base_url, cfg.llm.model);
    println!("  API key:     {}", key_state(cfg.llm.api_key.as_deref()));
    println!("  Timeout:     {}s", cfg.llm.policy.timeout_seconds);
    println!("  Attempts:    {}", cfg.llm.policy.retry.max_attempts);
    println!();
    println!("Pipeline:");
    println!("  Corrections window: {}", cfg.pipeline.corrections_window);
    println!("  Review threshold:   {}", cfg.pipeline.review_threshold);
    println!("  Bundle size:        {}", cfg.pipeline.default_bundle_size);
    println!("  Progress grace:     {}s", cfg.progress.grace_period_seconds);

    Ok(())
}

fn key_state(key: Option<&str>) -> &'static str {
    match key {
        Some(k) if !k.trim().is_empty() => "set",
        _ => "missing",
    }
}
