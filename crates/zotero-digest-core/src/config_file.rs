//! Layered JSON configuration.
//!
//! A config directory holds `default.json` (written on first use),
//! `user.json` (user overrides) and `recent.json` (the last effective run
//! config). Resolution order is built-in defaults < `default.json` <
//! `user.json`; command-line flags are applied on top by the caller.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::AnalyzerSettings;
use crate::llm::DEFAULT_BASE_URL;
use crate::pipeline::ItemFilter;

pub const DEFAULT_FILE: &str = "default.json";
pub const USER_FILE: &str = "user.json";
pub const RECENT_FILE: &str = "recent.json";

/// Written in place of the API key by [`ConfigManager::export`].
pub const MASKED_API_KEY: &str = "YOUR_API_KEY_HERE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("could not determine a config directory")]
    NoConfigDir,
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// On-disk configuration. All fields are optional so partial files work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate_titles: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_detailed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_statistics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// An API key worth using: not blank and not the export placeholder.
fn usable_api_key(s: Option<String>) -> Option<String> {
    non_empty(s).filter(|k| k != MASKED_API_KEY)
}

fn non_empty_list(v: Option<Vec<String>>) -> Option<Vec<String>> {
    v.filter(|v| !v.is_empty())
}

impl ConfigFile {
    /// Merge two configs: non-empty `overlay` values take precedence.
    pub fn merge(self, overlay: ConfigFile) -> ConfigFile {
        ConfigFile {
            api_key: usable_api_key(overlay.api_key).or(usable_api_key(self.api_key)),
            base_url: non_empty(overlay.base_url).or(self.base_url),
            model: non_empty(overlay.model).or(self.model),
            language: non_empty(overlay.language).or(self.language),
            database_path: non_empty(overlay.database_path).or(self.database_path),
            limit: overlay.limit.or(self.limit),
            include_types: non_empty_list(overlay.include_types).or(self.include_types),
            exclude_keywords: non_empty_list(overlay.exclude_keywords).or(self.exclude_keywords),
            selected_collections: non_empty_list(overlay.selected_collections)
                .or(self.selected_collections),
            delay: overlay.delay.or(self.delay),
            max_pages: overlay.max_pages.or(self.max_pages),
            max_tokens: overlay.max_tokens.or(self.max_tokens),
            translate_titles: overlay.translate_titles.or(self.translate_titles),
            request_timeout_secs: overlay.request_timeout_secs.or(self.request_timeout_secs),
            output_dir: non_empty(overlay.output_dir).or(self.output_dir),
            export_detailed: overlay.export_detailed.or(self.export_detailed),
            export_statistics: overlay.export_statistics.or(self.export_statistics),
            debug: overlay.debug.or(self.debug),
            log_level: non_empty(overlay.log_level).or(self.log_level),
        }
    }

    /// Set one field from its string form, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let text = || Some(value.trim().to_string());
        let list = || {
            Some(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>(),
            )
        };
        let boolean = || match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(invalid("expected true or false")),
        };

        match key {
            "api_key" => self.api_key = text(),
            "base_url" => self.base_url = text(),
            "model" => self.model = text(),
            "language" => self.language = text(),
            "database_path" => self.database_path = text(),
            "limit" => {
                self.limit = match value.trim() {
                    "" | "none" => None,
                    v => Some(v.parse().map_err(|_| invalid("expected an integer"))?),
                }
            }
            "include_types" => self.include_types = list(),
            "exclude_keywords" => self.exclude_keywords = list(),
            "selected_collections" => self.selected_collections = list(),
            "delay" => {
                let secs: f64 = value.trim().parse().map_err(|_| invalid("expected seconds"))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(invalid("must be a non-negative number"));
                }
                self.delay = Some(secs);
            }
            "max_pages" => {
                self.max_pages = Some(value.trim().parse().map_err(|_| invalid("expected an integer"))?)
            }
            "max_tokens" => {
                self.max_tokens = Some(value.trim().parse().map_err(|_| invalid("expected an integer"))?)
            }
            "request_timeout_secs" => {
                self.request_timeout_secs =
                    Some(value.trim().parse().map_err(|_| invalid("expected an integer"))?)
            }
            "translate_titles" => self.translate_titles = boolean()?,
            "output_dir" => self.output_dir = text(),
            "export_detailed" => self.export_detailed = boolean()?,
            "export_statistics" => self.export_statistics = boolean()?,
            "debug" => self.debug = boolean()?,
            "log_level" => {
                let level = value.trim().to_ascii_uppercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(invalid("expected one of TRACE, DEBUG, INFO, WARN, ERROR"));
                }
                self.log_level = Some(level);
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

pub const LOG_LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Fully resolved configuration for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    /// Empty means auto-detect.
    pub database_path: String,
    pub limit: Option<usize>,
    pub include_types: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub selected_collections: Vec<String>,
    /// Seconds between items.
    pub delay: f64,
    pub max_pages: usize,
    pub max_tokens: usize,
    pub translate_titles: bool,
    pub request_timeout_secs: u64,
    pub output_dir: String,
    pub export_detailed: bool,
    pub export_statistics: bool,
    pub debug: bool,
    pub log_level: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let settings = AnalyzerSettings::default();
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            model: settings.model,
            language: settings.language,
            database_path: String::new(),
            limit: None,
            include_types: Vec::new(),
            exclude_keywords: Vec::new(),
            selected_collections: Vec::new(),
            delay: 1.0,
            max_pages: settings.max_pages,
            max_tokens: settings.max_tokens,
            translate_titles: settings.translate_titles,
            request_timeout_secs: 120,
            output_dir: "output".into(),
            export_detailed: false,
            export_statistics: true,
            debug: false,
            log_level: "INFO".into(),
        }
    }
}

impl AnalyzerConfig {
    /// Built-in defaults overlaid with `file`.
    pub fn from_file(file: ConfigFile) -> Self {
        let d = AnalyzerConfig::default();
        Self {
            api_key: file.api_key.unwrap_or(d.api_key),
            base_url: file.base_url.unwrap_or(d.base_url),
            model: file.model.unwrap_or(d.model),
            language: file.language.unwrap_or(d.language),
            database_path: file.database_path.unwrap_or(d.database_path),
            limit: file.limit.or(d.limit),
            include_types: file.include_types.unwrap_or(d.include_types),
            exclude_keywords: file.exclude_keywords.unwrap_or(d.exclude_keywords),
            selected_collections: file.selected_collections.unwrap_or(d.selected_collections),
            delay: file.delay.unwrap_or(d.delay),
            max_pages: file.max_pages.unwrap_or(d.max_pages),
            max_tokens: file.max_tokens.unwrap_or(d.max_tokens),
            translate_titles: file.translate_titles.unwrap_or(d.translate_titles),
            request_timeout_secs: file.request_timeout_secs.unwrap_or(d.request_timeout_secs),
            output_dir: file.output_dir.unwrap_or(d.output_dir),
            export_detailed: file.export_detailed.unwrap_or(d.export_detailed),
            export_statistics: file.export_statistics.unwrap_or(d.export_statistics),
            debug: file.debug.unwrap_or(d.debug),
            log_level: file.log_level.unwrap_or(d.log_level),
        }
    }

    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            api_key: Some(self.api_key.clone()),
            base_url: Some(self.base_url.clone()),
            model: Some(self.model.clone()),
            language: Some(self.language.clone()),
            database_path: Some(self.database_path.clone()),
            limit: self.limit,
            include_types: Some(self.include_types.clone()),
            exclude_keywords: Some(self.exclude_keywords.clone()),
            selected_collections: Some(self.selected_collections.clone()),
            delay: Some(self.delay),
            max_pages: Some(self.max_pages),
            max_tokens: Some(self.max_tokens),
            translate_titles: Some(self.translate_titles),
            request_timeout_secs: Some(self.request_timeout_secs),
            output_dir: Some(self.output_dir.clone()),
            export_detailed: Some(self.export_detailed),
            export_statistics: Some(self.export_statistics),
            debug: Some(self.debug),
            log_level: Some(self.log_level.clone()),
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            model: self.model.clone(),
            language: self.language.clone(),
            max_pages: self.max_pages,
            max_tokens: self.max_tokens,
            translate_titles: self.translate_titles,
            ..AnalyzerSettings::default()
        }
    }

    pub fn item_filter(&self) -> ItemFilter {
        ItemFilter {
            include_types: self.include_types.clone(),
            exclude_keywords: self.exclude_keywords.clone(),
            limit: self.limit,
        }
    }

    /// Effective log level: `DEBUG` when debug mode is on.
    pub fn effective_log_level(&self) -> &str {
        if self.debug { "DEBUG" } else { &self.log_level }
    }

    /// Sectioned, human-readable summary. The API key is reported only as
    /// set or unset.
    pub fn summary(&self) -> Vec<(&'static str, Vec<(&'static str, String)>)> {
        let list = |v: &[String]| {
            if v.is_empty() {
                "(none)".to_string()
            } else {
                v.join(", ")
            }
        };
        vec![
            (
                "API",
                vec![
                    ("base_url", self.base_url.clone()),
                    ("model", self.model.clone()),
                    ("language", self.language.clone()),
                    ("api_key_set", (!self.api_key.is_empty()).to_string()),
                    ("request_timeout_secs", self.request_timeout_secs.to_string()),
                ],
            ),
            (
                "Library",
                vec![
                    (
                        "database_path",
                        if self.database_path.is_empty() {
                            "(auto-detect)".to_string()
                        } else {
                            self.database_path.clone()
                        },
                    ),
                    ("selected_collections", list(&self.selected_collections)),
                ],
            ),
            (
                "Filter",
                vec![
                    (
                        "limit",
                        self.limit
                            .filter(|l| *l > 0)
                            .map(|l| l.to_string())
                            .unwrap_or_else(|| "(none)".into()),
                    ),
                    ("include_types", list(&self.include_types)),
                    ("exclude_keywords", list(&self.exclude_keywords)),
                ],
            ),
            (
                "Processing",
                vec![
                    ("delay", format!("{}s", self.delay)),
                    ("max_pages", self.max_pages.to_string()),
                    ("max_tokens", self.max_tokens.to_string()),
                    ("translate_titles", self.translate_titles.to_string()),
                ],
            ),
            (
                "Output",
                vec![
                    ("output_dir", self.output_dir.clone()),
                    ("export_detailed", self.export_detailed.to_string()),
                    ("export_statistics", self.export_statistics.to_string()),
                ],
            ),
            (
                "Logging",
                vec![
                    ("debug", self.debug.to_string()),
                    ("log_level", self.log_level.clone()),
                ],
            ),
        ]
    }
}

/// Platform config directory: `<config_dir>/zotero-digest`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zotero-digest"))
}

/// Load a config file. `Ok(None)` if it does not exist.
pub fn load_from_path(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json(path: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Owns a config directory and its layered files.
pub struct ConfigManager {
    dir: PathBuf,
}

impl ConfigManager {
    /// Open (creating if needed) a config directory and write `default.json`
    /// on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let manager = Self { dir };
        let default_path = manager.default_path();
        if !default_path.exists() {
            write_json(&default_path, &AnalyzerConfig::default().to_file())?;
            tracing::info!(path = %default_path.display(), "created default config");
        }
        Ok(manager)
    }

    /// Open the platform config directory.
    pub fn open_default() -> Result<Self, ConfigError> {
        Self::new(default_config_dir().ok_or(ConfigError::NoConfigDir)?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_path(&self) -> PathBuf {
        self.dir.join(DEFAULT_FILE)
    }

    pub fn user_path(&self) -> PathBuf {
        self.dir.join(USER_FILE)
    }

    pub fn recent_path(&self) -> PathBuf {
        self.dir.join(RECENT_FILE)
    }

    /// Read a layer, treating an unreadable file as absent.
    fn layer(&self, path: &Path) -> ConfigFile {
        match load_from_path(path) {
            Ok(Some(file)) => file,
            Ok(None) => ConfigFile::default(),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "ignoring unreadable config");
                ConfigFile::default()
            }
        }
    }

    /// Resolve defaults < `default.json` < `user.json`.
    pub fn load(&self) -> AnalyzerConfig {
        let merged = self
            .layer(&self.default_path())
            .merge(self.layer(&self.user_path()));
        AnalyzerConfig::from_file(merged)
    }

    pub fn save_user(&self, config: &AnalyzerConfig) -> Result<(), ConfigError> {
        write_json(&self.user_path(), &config.to_file())?;
        tracing::info!("saved user config");
        Ok(())
    }

    pub fn save_recent(&self, config: &AnalyzerConfig) -> Result<(), ConfigError> {
        write_json(&self.recent_path(), &config.to_file())
    }

    pub fn load_recent(&self) -> Result<Option<AnalyzerConfig>, ConfigError> {
        Ok(load_from_path(&self.recent_path())?.map(AnalyzerConfig::from_file))
    }

    /// Update one field of `user.json`, leaving the other fields as they are.
    pub fn set_user_value(&self, key: &str, value: &str) -> Result<ConfigFile, ConfigError> {
        let mut user = load_from_path(&self.user_path())?.unwrap_or_default();
        user.set(key, value)?;
        write_json(&self.user_path(), &user)?;
        tracing::info!(key, "updated user config");
        Ok(user)
    }

    /// Move `user.json` aside as `user_backup_<unix-ts>.json`. Returns the
    /// backup path, or `None` if there was no user config.
    pub fn reset(&self) -> Result<Option<PathBuf>, ConfigError> {
        let user = self.user_path();
        if !user.exists() {
            return Ok(None);
        }
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let backup = self.dir.join(format!("user_backup_{}.json", ts));
        std::fs::rename(&user, &backup)?;
        tracing::info!(backup = %backup.display(), "backed up user config");
        Ok(Some(backup))
    }

    /// Write the effective config to `path` with the API key masked.
    pub fn export(&self, path: &Path) -> Result<(), ConfigError> {
        let mut file = self.load().to_file();
        if file.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            file.api_key = Some(MASKED_API_KEY.to_string());
        }
        write_json(path, &file)?;
        tracing::info!(path = %path.display(), "exported config");
        Ok(())
    }

    /// Validate `path` and store it as `user.json`. A masked API key from an
    /// export is dropped.
    pub fn import(&self, path: &Path) -> Result<(), ConfigError> {
        let mut file =
            load_from_path(path)?.ok_or_else(|| ConfigError::NotFound(path.to_path_buf()))?;
        file.api_key = usable_api_key(file.api_key.take());
        write_json(&self.user_path(), &file)?;
        tracing::info!(path = %path.display(), "imported config");
        Ok(())
    }
}
