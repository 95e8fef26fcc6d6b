/*
 * Manages application settings: which files the enumerator offers, how project
 * content is bucketed on export, and the debounce delays of the interactive
 * session. Settings are persisted as JSON in the per-user local configuration
 * directory (see `path_utils`); a missing file simply yields the defaults.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) so that callers and
 * tests can substitute a different storage location.
 */
use crate::core::aggregation::BucketRules;
use crate::core::file_enumerator::EnumerationRules;
use crate::core::path_utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "SolutionPacker";
const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    NoProjectDirectory,
    Json(serde_json::Error),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::NoProjectDirectory => {
                write!(f, "Could not determine the configuration directory")
            }
            ConfigError::Json(e) => write!(f, "Configuration file is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/*
 * User-tunable settings. Every field has a default so that settings files written by
 * older versions, or edited by hand with fields left out, still load.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /* File name suffixes offered in the tree, matched case-insensitively. */
    pub allowed_extensions: Vec<String>,
    /* Directory names skipped entirely, matched against whole path segments. */
    pub excluded_directories: Vec<String>,
    /* Files above this size are shown but cannot be selected. */
    pub max_file_size_bytes: u64,
    pub respect_ignore_files: bool,
    pub manifest_extensions: Vec<String>,
    pub properties_prefix: String,
    pub web_root_prefix: String,
    /* Files next to the solution file that are listed at the top of the tree. */
    pub solution_level_files: Vec<String>,
    pub filter_debounce_ms: u64,
    pub aggregation_debounce_ms: u64,
    pub status_message_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        let to_strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        AppSettings {
            allowed_extensions: to_strings(&[
                ".cs", ".vb", ".fs", ".csproj", ".vbproj", ".fsproj", ".sqlproj", ".sln",
                ".slnx", ".props", ".targets", ".json", ".xml", ".config", ".resx", ".xaml",
                ".razor", ".cshtml", ".html", ".css", ".scss", ".js", ".ts", ".sql", ".md",
                ".yml", ".yaml", ".txt",
            ]),
            excluded_directories: to_strings(&[
                "bin",
                "obj",
                ".git",
                ".vs",
                ".idea",
                "node_modules",
                "packages",
                "TestResults",
            ]),
            max_file_size_bytes: 512 * 1024,
            respect_ignore_files: false,
            manifest_extensions: BucketRules::default().manifest_extensions,
            properties_prefix: BucketRules::default().properties_prefix,
            web_root_prefix: BucketRules::default().web_root_prefix,
            solution_level_files: to_strings(&[
                "Directory.Build.props",
                "Directory.Build.targets",
                "Directory.Packages.props",
                "global.json",
                "nuget.config",
            ]),
            filter_debounce_ms: 250,
            aggregation_debounce_ms: 150,
            status_message_ms: 4000,
        }
    }
}

impl AppSettings {
    pub fn enumeration_rules(&self) -> EnumerationRules {
        EnumerationRules {
            allowed_suffixes: self
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            excluded_directories: self
                .excluded_directories
                .iter()
                .map(|dir| dir.to_lowercase())
                .collect(),
            max_file_size: self.max_file_size_bytes,
            respect_ignore_files: self.respect_ignore_files,
        }
    }

    pub fn bucket_rules(&self) -> BucketRules {
        BucketRules {
            manifest_extensions: self.manifest_extensions.clone(),
            properties_prefix: self.properties_prefix.clone(),
            web_root_prefix: self.web_root_prefix.clone(),
        }
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn aggregation_debounce(&self) -> Duration {
        Duration::from_millis(self.aggregation_debounce_ms)
    }

    pub fn status_message_duration(&self) -> Duration {
        Duration::from_millis(self.status_message_ms)
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn load_settings(&self, app_name: &str) -> Result<AppSettings>;
    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()>;
}

/*
 * Stores settings in `settings.json` under the directory given by
 * `path_utils::get_base_app_config_local_dir`, or under an explicit directory.
 */
pub struct CoreConfigManager {
    config_dir_override: Option<PathBuf>,
}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {
            config_dir_override: None,
        }
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        CoreConfigManager {
            config_dir_override: Some(config_dir),
        }
    }

    fn settings_path(&self, app_name: &str) -> Result<PathBuf> {
        let config_dir = match &self.config_dir_override {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(ConfigError::NoProjectDirectory)?,
        };
        Ok(config_dir.join(SETTINGS_FILENAME))
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    fn load_settings(&self, app_name: &str) -> Result<AppSettings> {
        let file_path = self.settings_path(app_name)?;
        if !file_path.exists() {
            log::debug!("CoreConfigManager: No settings at {file_path:?}, using defaults.");
            return Ok(AppSettings::default());
        }
        let contents = fs::read_to_string(&file_path)?;
        if contents.trim().is_empty() {
            log::debug!("CoreConfigManager: Settings file {file_path:?} is empty.");
            return Ok(AppSettings::default());
        }
        let settings: AppSettings = serde_json::from_str(&contents)?;
        log::debug!("CoreConfigManager: Loaded settings from {file_path:?}.");
        Ok(settings)
    }

    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()> {
        let file_path = self.settings_path(app_name)?;
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&file_path, json)?;
        log::debug!("CoreConfigManager: Saved settings to {file_path:?}.");
        Ok(())
    }
}

/* Loads settings, falling back to the defaults (with a warning) when they cannot be read. */
pub fn load_settings_or_default(manager: &dyn ConfigManagerOperations) -> AppSettings {
    match manager.load_settings(APP_NAME) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Config: {e}. Falling back to default settings.");
            AppSettings::default()
        }
    }
}

/* Whether `path`'s file name is one of the configured solution-level files. */
pub fn is_solution_level_file(settings: &AppSettings, path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    settings
        .solution_level_files
        .iter()
        .any(|candidate| candidate.to_lowercase() == name)
}
