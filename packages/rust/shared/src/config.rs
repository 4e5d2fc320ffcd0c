//! Application configuration for patternlang.
//!
//! User config lives at `~/.patternlang/patternlang.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PatternLangError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "patternlang.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".patternlang";

/// Hard upper bound on link expansion depth exposed to callers.
pub const MAX_EXPANSION_DEPTH: u32 = 3;

/// Longest accepted re-ingestion interval.
pub const MAX_UPDATE_INTERVAL_DAYS: u64 = 365;

// ---------------------------------------------------------------------------
// Config structs (matching patternlang.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where pattern documents come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP query API.
    #[serde(default)]
    pub server: ServerConfig,

    /// Re-ingestion schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Metadata echoed by the API index route.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding one Markdown document per pattern.
    #[serde(default = "default_patterns_dir")]
    pub patterns_dir: PathBuf,

    /// Extension (without the dot) of files treated as documents.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Command run before each ingestion to refresh the corpus
    /// (e.g. `["git", "-C", "apl-md", "pull"]`). Empty disables it.
    #[serde(default)]
    pub refresh_command: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            patterns_dir: default_patterns_dir(),
            extension: default_extension(),
            refresh_command: Vec::new(),
        }
    }
}

fn default_patterns_dir() -> PathBuf {
    PathBuf::from("apl-md/Patterns")
}
fn default_extension() -> String {
    "md".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("apl.db")
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Expansion depth when a request does not specify one.
    #[serde(default = "default_depth")]
    pub default_depth: u32,

    /// Largest expansion depth a request may ask for.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_depth: default_depth(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}
fn default_depth() -> u32 {
    1
}
fn default_max_depth() -> u32 {
    MAX_EXPANSION_DEPTH
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// How often, in days, to re-ingest the corpus.
    #[serde(default = "default_update_interval_days")]
    pub update_interval_days: u64,

    /// Run one ingestion immediately when the server starts.
    #[serde(default = "default_true")]
    pub ingest_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_interval_days: default_update_interval_days(),
            ingest_on_startup: true,
        }
    }
}

fn default_update_interval_days() -> u64 {
    1
}
fn default_true() -> bool {
    true
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_service_description")]
    pub description: String,

    #[serde(default = "default_contact_url")]
    pub contact_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            description: default_service_description(),
            contact_url: default_contact_url(),
        }
    }
}

fn default_service_name() -> String {
    "A Pattern Language API".into()
}
fn default_service_description() -> String {
    "Search and retrieve patterns from Christopher Alexander's A Pattern Language \
     by name, id, page, confidence or tag, and explore their links and backlinks."
        .into()
}
fn default_contact_url() -> String {
    "https://patternlanguage.cc".into()
}

impl AppConfig {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_UPDATE_INTERVAL_DAYS).contains(&self.schedule.update_interval_days) {
            return Err(PatternLangError::config(format!(
                "schedule.update_interval_days must be between 1 and {MAX_UPDATE_INTERVAL_DAYS}"
            )));
        }
        if self.server.max_depth > MAX_EXPANSION_DEPTH {
            return Err(PatternLangError::config(format!(
                "server.max_depth must not exceed {MAX_EXPANSION_DEPTH}"
            )));
        }
        if self.server.default_depth > self.server.max_depth {
            return Err(PatternLangError::config(
                "server.default_depth must not exceed server.max_depth",
            ));
        }
        if self.source.extension.trim().is_empty() {
            return Err(PatternLangError::config("source.extension must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.patternlang/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PatternLangError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.patternlang/patternlang.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PatternLangError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PatternLangError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PatternLangError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PatternLangError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PatternLangError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("patterns_dir"));
        assert!(toml_str.contains("update_interval_days"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.max_depth, 3);
        assert_eq!(parsed.server.default_depth, 1);
        assert_eq!(parsed.storage.database, PathBuf::from("apl.db"));
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[source]
patterns_dir = "/srv/apl-md/Patterns"
refresh_command = ["git", "-C", "/srv/apl-md", "pull"]

[schedule]
update_interval_days = 7
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.extension, "md");
        assert_eq!(config.source.refresh_command.len(), 4);
        assert_eq!(config.schedule.update_interval_days, 7);
        assert!(config.schedule.ingest_on_startup);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn validation_rejects_bad_depths_and_interval() {
        let mut config = AppConfig::default();
        config.server.max_depth = 4;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.default_depth = 3;
        config.server.max_depth = 2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.update_interval_days = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("update_interval_days"));
    }

    #[test]
    fn validation_caps_update_interval() {
        let mut config = AppConfig::default();
        config.schedule.update_interval_days = MAX_UPDATE_INTERVAL_DAYS;
        assert!(config.validate().is_ok());

        config.schedule.update_interval_days = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("update_interval_days"));
    }

    #[test]
    fn load_config_from_reports_parse_errors() {
        let tmp = std::env::temp_dir().join(format!("pl_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&tmp, "[server\nbind = 1").expect("write");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
        let _ = std::fs::remove_file(&tmp);
    }
}
