use hive_storage::{Role, UserId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found. Create ~/.hive/config.json with at least one profile.")]
    NotFound,
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No profiles configured")]
    NoProfiles,
    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),
    #[error("Invalid profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },
    #[error("Failed to get home directory")]
    NoHomeDir,
}

/// Client configuration stored in ~/.hive/config.json
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HiveConfig {
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub current_profile: Option<String>, // Name of current profile
    /// Absent means no remote store: writes and pulls fail closed.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// A signed-in identity the client can act as
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProfileConfig {
    pub name: String,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    /// Role string as issued by the identity provider
    pub role: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub approved: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RemoteConfig {
    pub database_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CacheConfig {
    /// SQLite file; defaults to ~/.hive/cache.db
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Subscription supervision and refresh tuning
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Consecutive failed reconnects before a subscription reports degraded
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Periodic full refresh; 0 disables it
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Buffered cache change notifications per subscriber
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    8
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    100
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

impl HiveConfig {
    /// Load config from default path (~/.hive/config.json)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path()?)
    }

    /// Load config from custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Get default config path (~/.hive/config.json)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::home_dir()
            .ok_or(ConfigError::NoHomeDir)?
            .join(".hive")
            .join("config.json"))
    }

    /// Get the current profile, falling back to the first one
    pub fn get_current_profile(&self) -> Result<&ProfileConfig, ConfigError> {
        let profile_name = self
            .current_profile
            .as_ref()
            .or_else(|| self.profiles.first().map(|p| &p.name))
            .ok_or(ConfigError::NoProfiles)?;

        self.get_profile(profile_name)
    }

    /// Get a profile by name
    pub fn get_profile(&self, name: &str) -> Result<&ProfileConfig, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }
}

impl ProfileConfig {
    /// Parse the role string into the closed role set.
    pub fn role(&self) -> Result<Role, ConfigError> {
        self.role.parse().map_err(|e: hive_storage::ParseValueError| {
            ConfigError::InvalidProfile {
                profile: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Name shown in audit entries.
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.name)
    }
}
