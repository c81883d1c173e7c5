use kanban_core::sync::DEFAULT_TASK_CONTENT;
use kanban_core::{IdAllocation, SyncSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Identity the CLI signs in as
#[derive(Debug, Clone, Serialize)]
pub struct UserConfig {
    pub uid: ConfigValue<String>,
    pub display_name: ConfigValue<String>,
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the board documents
    pub data_dir: ConfigValue<PathBuf>,
    pub user: UserConfig,
    /// How new task and column ids are claimed
    pub id_allocation: ConfigValue<IdAllocation>,
    /// Content of newly added tasks
    pub task_content: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    user: Option<UserFile>,
    id_allocation: Option<IdAllocation>,
    task_content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct UserFile {
    uid: Option<String>,
    display_name: Option<String>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`], reading environment variables through `env`.
    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_name = env("USER").unwrap_or_else(|| "Kanban User".to_string());
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut uid = ConfigValue::new("local".to_string(), ConfigSource::Default);
        let mut display_name = ConfigValue::new(default_name, ConfigSource::Default);
        let mut id_allocation = ConfigValue::new(IdAllocation::default(), ConfigSource::Default);
        let mut task_content =
            ConfigValue::new(DEFAULT_TASK_CONTENT.to_string(), ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            // A freshly initialised file holds only comments
            let file_config: ConfigFile = if is_blank_yaml(&contents) {
                ConfigFile::default()
            } else {
                serde_yaml::from_str(&contents)
                    .map_err(|e| ConfigError::ParseError(path.clone(), e))?
            };

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Relative to the config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(user) = file_config.user {
                if let Some(value) = user.uid {
                    uid = ConfigValue::new(value, ConfigSource::File);
                }
                if let Some(value) = user.display_name {
                    display_name = ConfigValue::new(value, ConfigSource::File);
                }
            }
            if let Some(value) = file_config.id_allocation {
                id_allocation = ConfigValue::new(value, ConfigSource::File);
            }
            if let Some(value) = file_config.task_content {
                task_content = ConfigValue::new(value, ConfigSource::File);
            }
        }

        if let Some(dir) = env("KANBAN_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(value) = env("KANBAN_UID") {
            uid = ConfigValue::new(value, ConfigSource::Environment);
        }
        if let Some(value) = env("KANBAN_DISPLAY_NAME") {
            display_name = ConfigValue::new(value, ConfigSource::Environment);
        }

        Ok(Self {
            data_dir,
            user: UserConfig { uid, display_name },
            id_allocation,
            task_content,
            config_file,
        })
    }

    /// Settings handed to the sync layer
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            id_allocation: self.id_allocation.value,
            task_content: self.task_content.value.clone(),
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/kanban/
    /// - macOS: ~/Library/Application Support/kanban/
    /// - Windows: %APPDATA%/kanban/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kanban")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/kanban/
    /// - macOS: ~/Library/Application Support/kanban/
    /// - Windows: %APPDATA%/kanban/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kanban")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn is_blank_yaml(contents: &str) -> bool {
    contents.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
