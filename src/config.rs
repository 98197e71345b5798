use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SubstrateError;
use crate::logging::{self, LogConfig};
use crate::session::{SessionTokens, DEFAULT_TOKEN_KEY};
use crate::store::ExpiringStore;
use crate::substrate::{FileSubstrate, MemorySubstrate, Substrate};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Figment(#[source] Box<figment::Error>),

    #[error("backend = file requires `dir`")]
    MissingDir,

    #[error("token_key cannot be empty")]
    EmptyTokenKey,

    #[error("session_ttl_secs must be positive")]
    ZeroSessionTtl,

    #[error("quota_bytes must be positive when set")]
    ZeroQuota,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    File,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which substrate to open (memory, file)
    #[serde(default)]
    pub backend: Backend,

    /// Record directory for the file backend
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Byte quota for the memory backend (unbounded if unset)
    #[serde(default)]
    pub quota_bytes: Option<usize>,

    /// Key the session token is kept under
    #[serde(default = "default_token_key")]
    pub token_key: String,

    /// Lifetime of a freshly stored session token
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            dir: None,
            quota_bytes: None,
            token_key: default_token_key(),
            session_ttl_secs: default_session_ttl_secs(),
            logging: LogConfig::default(),
        }
    }
}

fn default_token_key() -> String {
    DEFAULT_TOKEN_KEY.to_string()
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl StoreConfig {
    pub const ENV_PREFIX: &'static str = "CREDCACHE_";
    pub const DEFAULT_FILE: &'static str = "credcache.yaml";

    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `credcache.yaml` in the working directory (optional)
    /// 3. Environment variables (`CREDCACHE_*`, `__` separates nested keys)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_layered(Self::DEFAULT_FILE)
    }

    /// Same as [`load`](Self::load) with an explicit YAML path.
    pub fn load_layered(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: StoreConfig = Figment::new()
            .merge(Serialized::defaults(StoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, ignoring the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: StoreConfig = Figment::new()
            .merge(Serialized::defaults(StoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == Backend::File && self.dir.is_none() {
            return Err(ConfigError::MissingDir);
        }
        if self.token_key.is_empty() {
            return Err(ConfigError::EmptyTokenKey);
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::ZeroSessionTtl);
        }
        if self.quota_bytes == Some(0) {
            return Err(ConfigError::ZeroQuota);
        }
        if logging::parse_level(&self.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Opens the configured substrate.
    pub fn open_substrate(&self) -> Result<Arc<dyn Substrate>, ConfigError> {
        self.validate()?;
        let substrate: Arc<dyn Substrate> = match self.backend {
            Backend::Memory => match self.quota_bytes {
                Some(quota) => Arc::new(MemorySubstrate::with_quota(quota)),
                None => Arc::new(MemorySubstrate::new()),
            },
            Backend::File => {
                let dir = self.dir.as_ref().ok_or(ConfigError::MissingDir)?;
                Arc::new(FileSubstrate::open(dir)?)
            }
        };
        tracing::debug!(backend = ?self.backend, "opened substrate");
        Ok(substrate)
    }

    /// A [`SessionTokens`] over a freshly opened substrate.
    pub fn session_tokens(&self) -> Result<SessionTokens, ConfigError> {
        let store = ExpiringStore::builder(self.open_substrate()?).build();
        Ok(SessionTokens::with_key(store, self.token_key.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
