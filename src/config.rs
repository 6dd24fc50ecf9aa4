use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token substituted with the current timestamp in commit messages
pub const DATE_TOKEN: &str = "{{date}}";

/// Timestamp format used when rendering [`DATE_TOKEN`]
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Main configuration structure for vaultsync
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Local vault settings
    #[serde(default)]
    pub vault: VaultConfig,

    /// GitHub repository and credentials
    #[serde(default)]
    pub github: GitHubConfig,

    /// File exclusion rules
    #[serde(default)]
    pub filters: FilterConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sync history persistence
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Local vault configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VaultConfig {
    /// Root directory of the vault
    #[serde(default = "default_vault_path")]
    pub path: String,

    /// Name of the host application's config directory inside the vault.
    /// Replaces the `{{configDir}}` token in excluded folders.
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GitHubConfig {
    /// Account or organization that owns the repository
    #[serde(default)]
    pub owner: String,

    /// Personal access token (falls back to GITHUB_TOKEN)
    #[serde(default)]
    pub token: String,

    /// Repository name
    #[serde(default)]
    pub repository: String,

    /// Branch to read from and commit to
    #[serde(default = "default_branch")]
    pub branch: String,

    /// API base URL, override for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Visibility used when the repository has to be created
    #[serde(default = "default_true")]
    pub private: bool,
}

/// Exclusion rules applied to both pushed and pulled paths
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    /// Path prefixes that are never synchronized
    #[serde(default = "default_excluded_folders")]
    pub excluded_folders: Vec<String>,

    /// File names, path suffixes or `*` globs that are never synchronized
    #[serde(default = "default_excluded_files")]
    pub excluded_files: Vec<String>,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Commit message template, `{{date}}` is replaced with the current time
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Enable periodic synchronization
    #[serde(default)]
    pub auto_sync: bool,

    /// Minutes between automatic syncs
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

/// Sync history configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Record every operation result
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database location (defaults to XDG data dir)
    #[serde(default)]
    pub path: Option<String>,
}

/// Lower bound of the interval offered to users, in minutes
pub const MIN_INTERVAL_MINUTES: u64 = 5;
/// Upper bound of the interval offered to users, in minutes
pub const MAX_INTERVAL_MINUTES: u64 = 120;

// Default value functions
fn default_vault_path() -> String {
    "${HOME}/Vault".to_string()
}
fn default_config_dir() -> String {
    ".obsidian".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_true() -> bool {
    true
}
fn default_excluded_folders() -> Vec<String> {
    vec![
        "{{configDir}}/".to_string(),
        ".git/".to_string(),
        ".trash/".to_string(),
    ]
}
fn default_excluded_files() -> Vec<String> {
    vec![".DS_Store".to_string(), "Thumbs.db".to_string()]
}
fn default_commit_message() -> String {
    format!("Vault sync: {}", DATE_TOKEN)
}
fn default_interval_minutes() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
            config_dir: default_config_dir(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            token: String::new(),
            repository: String::new(),
            branch: default_branch(),
            api_url: default_api_url(),
            private: default_true(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_folders: default_excluded_folders(),
            excluded_files: default_excluded_files(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            commit_message: default_commit_message(),
            auto_sync: false,
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);

            config.apply_env_overrides();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.apply_env_overrides();
        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("vaultsync").join("config.yml"))
    }

    /// Fill in values that may come from the environment
    pub fn apply_env_overrides(&mut self) {
        if self.github.token.is_empty() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                if !token.is_empty() {
                    tracing::debug!("Using GITHUB_TOKEN from environment");
                    self.github.token = token;
                }
            }
        }
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.vault.path = shellexpand::full(&self.vault.path)
            .context("Failed to expand vault path")?
            .into_owned();

        if let Some(path) = &self.history.path {
            self.history.path = Some(
                shellexpand::full(path)
                    .context("Failed to expand history path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Whether enough is configured to talk to the remote at all
    pub fn is_configured(&self) -> bool {
        !self.github.owner.trim().is_empty()
            && !self.github.token.trim().is_empty()
            && !self.github.repository.trim().is_empty()
    }

    /// Root directory of the vault
    pub fn vault_root(&self) -> PathBuf {
        PathBuf::from(&self.vault.path)
    }

    /// Render the commit message template at the given time
    pub fn render_commit_message(&self, now: DateTime<Local>) -> String {
        self.sync
            .commit_message
            .replace(DATE_TOKEN, &now.format(DATE_FORMAT).to_string())
    }

    /// Whether the configured interval lies within the range offered to users
    pub fn interval_in_recommended_range(&self) -> bool {
        (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&self.sync.interval_minutes)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            github: GitHubConfig::default(),
            filters: FilterConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}
