use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::github::DEFAULT_API_URL;
use crate::repository::Owner;

/// Main configuration structure for repos
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub API and authentication settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Previously used owner → directory mappings
    #[serde(default)]
    pub pairs: Vec<SyncPair>,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://github.example.com/api/v3` for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "token", "gh_cli"
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum concurrent clone/pull operations (unbounded when unset)
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// git executable to run
    #[serde(default = "default_git_program")]
    pub git_program: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            auth_method: default_auth_method(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            git_program: default_git_program(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A stored owner → directory mapping.
///
/// Serialized as `org:<name>:<dir>` or `user:<name>:<dir>`. Everything after
/// the second `:` is the directory, so Windows drive letters survive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPair {
    pub owner: Owner,
    pub directory: String,
}

impl SyncPair {
    pub fn new(owner: Owner, directory: impl Into<String>) -> Self {
        Self {
            owner,
            directory: directory.into(),
        }
    }
}

impl fmt::Display for SyncPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner.kind(), self.owner.name(), self.directory)
    }
}

impl TryFrom<String> for SyncPair {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let mut parts = value.splitn(3, ':');
        let (kind, name, directory) = match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(name), Some(directory)) => (kind, name, directory),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "stored pair {:?} is not of the form kind:name:directory",
                    value
                )))
            }
        };

        let owner = match kind {
            "org" => Owner::from_parts(Some(name), None)?,
            "user" => Owner::from_parts(None, Some(name))?,
            other => {
                return Err(Error::InvalidInput(format!(
                    "stored pair {:?} has unknown owner kind {:?}",
                    value, other
                )))
            }
        };

        Ok(Self::new(owner, directory))
    }
}

impl From<SyncPair> for String {
    fn from(pair: SyncPair) -> Self {
        pair.to_string()
    }
}

/// Everything one sync run needs, assembled once before any work starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub api_base_url: String,
    pub owner: Owner,
    pub token: String,
    pub target_dir: PathBuf,
}

impl SyncRequest {
    /// Validate the inputs and build a request.
    ///
    /// An empty `directory` resolves to `<home>/<owner name>`; `~` and
    /// environment variables are expanded.
    pub fn new(
        api_base_url: impl Into<String>,
        owner: Owner,
        token: impl Into<String>,
        directory: &str,
    ) -> std::result::Result<Self, Error> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::AuthMissing("the access token is empty".to_string()));
        }

        let target_dir = resolve_target_dir(&owner, directory)?;

        Ok(Self {
            api_base_url: api_base_url.into(),
            owner,
            token: token.trim().to_string(),
            target_dir,
        })
    }

    /// The pair to remember after this request ran
    pub fn pair(&self) -> SyncPair {
        SyncPair::new(
            self.owner.clone(),
            self.target_dir.to_string_lossy().into_owned(),
        )
    }
}

/// Expand and clean `directory`, defaulting to `<home>/<owner name>`
pub fn resolve_target_dir(owner: &Owner, directory: &str) -> std::result::Result<PathBuf, Error> {
    let directory = directory.trim();
    if directory.is_empty() {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::InvalidInput("could not determine the home directory".to_string())
        })?;
        return Ok(home.join(owner.name()).clean());
    }

    let expanded = shellexpand::full(directory).map_err(|e| {
        Error::InvalidInput(format!("failed to expand directory {:?}: {}", directory, e))
    })?;
    Ok(PathBuf::from(expanded.as_ref()).clean())
}

impl Config {
    /// Load configuration from `path`, or `None` when there is no file yet
    pub fn load_existing(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // An empty file is a valid, empty configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repos").join("config.yml"))
    }

    /// Remember `pair` unless an identical one is already stored.
    ///
    /// Returns whether the list changed.
    pub fn record_pair(&mut self, pair: SyncPair) -> bool {
        if self.pairs.contains(&pair) {
            false
        } else {
            self.pairs.push(pair);
            true
        }
    }

    /// Turn every stored pair into a request against `api_base_url`
    pub fn requests(
        &self,
        api_base_url: &str,
        token: &str,
    ) -> std::result::Result<Vec<SyncRequest>, Error> {
        self.pairs
            .iter()
            .map(|pair| {
                SyncRequest::new(
                    api_base_url,
                    pair.owner.clone(),
                    token,
                    &pair.directory,
                )
            })
            .collect()
    }
}
