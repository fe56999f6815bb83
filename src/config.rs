//! Configuration for gravity.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (GRAVITY_HOME, GRAVITY_DB, DEEPGRAM_API_KEY, ANTHROPIC_API_KEY)
//! 2. Config file (.gravity/config.yaml)
//! 3. Defaults (~/.gravity)
//!
//! Config file discovery:
//! - Searches current directory and parents for .gravity/config.yaml
//! - Paths in config file are relative to the .gravity/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{AnthropicSettings, DeepgramSettings};
use crate::core::PipelineSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const CONFIG_DIR: &str = ".gravity";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DATABASE_FILE: &str = "gravity.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub transcription: DeepgramSettings,
    #[serde(default)]
    pub llm: AnthropicSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub progress: ProgressSettings,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory (relative to .gravity/)
    pub home: Option<String>,
    /// Database file (relative to .gravity/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSettings {
    /// How long finished requests stay readable
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

fn default_grace_period() -> u64 {
    300
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period(),
        }
    }
}

impl ProgressSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

/// Resolved configuration with absolute paths and credentials applied
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to the data directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub transcription: DeepgramSettings,
    pub llm: AnthropicSettings,
    pub pipeline: PipelineSettings,
    pub progress: ProgressSettings,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve configuration starting the file search at `start`, reading
/// environment variables through `env`
pub fn load_config_from(
    start: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = find_config_file(start);

    let (file, config_dir) = match &config_file {
        Some(path) => {
            let file = load_config_file(path)?;
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (Some(file), Some(dir))
        }
        None => (None, None),
    };

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env("GRAVITY_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home)) = (&config_dir, &paths.home) {
        resolve_path(dir, home)
    } else {
        default_home
    };

    let database = if let Some(env_db) = env("GRAVITY_DB") {
        PathBuf::from(env_db)
    } else if let (Some(dir), Some(db)) = (&config_dir, &paths.database) {
        resolve_path(dir, db)
    } else {
        home.join(DATABASE_FILE)
    };

    let (mut transcription, mut llm, pipeline, progress) = match file {
        Some(f) => (f.transcription, f.llm, f.pipeline, f.progress),
        None => Default::default(),
    };

    // Credentials come from the environment when set there
    if let Some(key) = env("DEEPGRAM_API_KEY") {
        transcription.api_key = Some(key);
    }
    if let Some(key) = env("ANTHROPIC_API_KEY") {
        llm.api_key = Some(key);
    }

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        transcription,
        llm,
        pipeline,
        progress,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    load_config_from(&cwd, env_var)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(temp.path(), env_from(&[])).unwrap();

        // Unless some ancestor of the temp dir carries a config file
        if config.config_file.is_none() {
            let expected_home = dirs::home_dir().unwrap().join(".gravity");
            assert_eq!(config.home, expected_home);
            assert_eq!(config.database, expected_home.join("gravity.db"));
            assert_eq!(config.pipeline, PipelineSettings::default());
            assert!(config.transcription.api_key.is_none());
        }
    }

    #[test]
    fn test_config_file_parsing_and_discovery() {
        let temp = TempDir::new().unwrap();
        let gravity_dir = temp.path().join(".gravity");
        std::fs::create_dir_all(&gravity_dir).unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let mut file = std::fs::File::create(gravity_dir.join("config.yaml")).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./data
transcription:
  model: nova-3
  policy:
    timeout_seconds: 20
    retry:
      max_attempts: 5
llm:
  max_tokens: 2048
pipeline:
  review_threshold: 0.7
progress:
  grace_period_seconds: 30
"#
        )
        .unwrap();

        let config = load_config_from(&nested, env_from(&[("ANTHROPIC_API_KEY", "sk-test")]))
            .unwrap();

        assert_eq!(config.home, gravity_dir.join("data"));
        assert_eq!(config.database, gravity_dir.join("data").join("gravity.db"));
        assert_eq!(config.transcription.model, "nova-3");
        assert_eq!(config.transcription.policy.timeout_seconds, 20);
        assert_eq!(config.transcription.policy.retry.max_attempts, 5);
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(config.transcription.api_key.is_none());
        assert_eq!(config.pipeline.review_threshold, 0.7);
        assert_eq!(config.pipeline.corrections_window, 10);
        assert_eq!(config.progress.grace_period(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides_paths() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(
            temp.path(),
            env_from(&[("GRAVITY_HOME", "/srv/gravity"), ("GRAVITY_DB", "/tmp/g.db")]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/gravity"));
        assert_eq!(config.database, PathBuf::from("/tmp/g.db"));
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(
            temp.path(),
            env_from(&[("DEEPGRAM_API_KEY", "dg-secret")]),
        )
        .unwrap();

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("dg-secret"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
