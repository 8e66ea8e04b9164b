//! # Agent Configuration Module
//!
//! Provides configuration management for the folder sync agent.
//!
//! ## Overview
//!
//! An [`AgentConfig`] describes one pairing of a local folder with one remote
//! namespace: where the local metadata database lives, how to reach the
//! metadata service and the object store, and how the pipeline behaves
//! (queue capacity, debounce window, retry schedule, ignore patterns).
//!
//! Configurations are either built in code through [`AgentConfig::builder`]
//! or loaded from `<root>/.ignore/config.yaml` with [`AgentConfig::load`].
//! Both paths end in [`AgentConfig::validate`], which fails fast with an
//! actionable [`Error::Config`] naming the offending key.
//!
//! ## File Format
//!
//! ```yaml
//! database: local            # ".db" is appended when missing
//! network:
//!   host: 10.0.0.5
//!   port: 8000
//! minio:
//!   host: 10.0.0.5
//!   port: "9000"             # numbers or numeric strings
//!   id: agent
//!   password: s3cret
//!   bucket: shared
//! sync:                      # optional
//!   queue_capacity: 1024     # 0 = unbounded
//!   debounce_ms: 0
//!   retry: { max_attempts: 5, initial_backoff_ms: 200, max_backoff_ms: 30000, multiplier: 2.0 }
//!   ignore: ["*.tmp", "~$*"]
//! logging:                   # optional
//!   level: info
//!   format: compact
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AgentConfig;
//!
//! let config = AgentConfig::builder()
//!     .root("/data/shared")
//!     .database_path("/data/shared/.ignore/local.db")
//!     .metadata_service("localhost", 8000)
//!     .object_store("localhost", 9000, "agent", "s3cret", "shared")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use bridge_traits::time::LogLevel;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Reserved control directory under the watched root
pub const CONTROL_DIR: &str = ".ignore";

/// Configuration file name inside [`CONTROL_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Configuration for one watched folder.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Absolute path of the watched folder
    pub root: PathBuf,

    /// Path to the SQLite database holding local records
    pub database_path: PathBuf,

    /// Remote metadata service endpoint
    pub metadata_service: EndpointConfig,

    /// Object store endpoint and credentials
    pub object_store: ObjectStoreSettings,

    /// Pipeline tuning
    pub sync: SyncSettings,

    /// Log level and format
    pub logging: LogSettings,
}

/// Host and port of an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
}

/// Object store endpoint, credentials and bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStoreSettings {
    pub host: String,
    pub port: u16,
    pub access_id: String,
    pub secret: String,
    pub bucket: String,
}

impl fmt::Debug for ObjectStoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("access_id", &self.access_id)
            .field("secret", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Pipeline tuning knobs. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Bounded queue capacity; 0 selects an unbounded queue
    pub queue_capacity: usize,

    /// Window in which identical live events are dropped; 0 disables debouncing
    pub debounce_ms: u64,

    /// Retry schedule for transient failures
    pub retry: RetrySettings,

    /// Glob patterns excluded from synchronization
    pub ignore: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            debounce_ms: 0,
            retry: RetrySettings::default(),
            ignore: Vec::new(),
        }
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per event, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Logging section of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::default(),
        }
    }
}

impl AgentConfig {
    /// Creates a new builder for constructing an `AgentConfig`.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Path of the reserved control directory
    pub fn control_dir(&self) -> PathBuf {
        self.root.join(CONTROL_DIR)
    }

    /// Load `<root>/.ignore/config.yaml`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the root or the control directory is missing, a
    ///   required key is absent, or a port is not numeric
    /// - `Error::Io` when the file cannot be read
    /// - `Error::Yaml` when the file is not valid YAML
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "Please check folder path: {}",
                root.display()
            )));
        }

        let control_dir = root.join(CONTROL_DIR);
        if !control_dir.is_dir() {
            return Err(Error::Config(format!(
                "Please check ignore folder path: {}",
                control_dir.display()
            )));
        }

        let config_path = control_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(|source| Error::Io {
            path: config_path.clone(),
            source,
        })?;

        Self::from_yaml_str(root, &contents, &config_path)
    }

    /// Parse configuration text for the folder at `root`.
    ///
    /// `origin` only appears in error messages.
    pub fn from_yaml_str(root: &Path, contents: &str, origin: &Path) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| Error::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;

        let missing = |key: &str| {
            Error::Config(format!(
                "Please check \"{}\" key in yaml: {}",
                key,
                origin.display()
            ))
        };

        let database = raw.database.ok_or_else(|| missing("database"))?;
        let network = raw.network.ok_or_else(|| missing("network"))?;
        let minio = raw.minio.ok_or_else(|| missing("minio"))?;

        let metadata_service = EndpointConfig {
            host: network.host.ok_or_else(|| missing("network::host"))?,
            port: network
                .port
                .ok_or_else(|| missing("network::port"))?
                .into_port("network::port", origin)?,
        };

        let object_store = ObjectStoreSettings {
            host: minio.host.ok_or_else(|| missing("minio::host"))?,
            port: minio
                .port
                .ok_or_else(|| missing("minio::port"))?
                .into_port("minio::port", origin)?,
            access_id: minio.id.ok_or_else(|| missing("minio::id"))?,
            secret: minio.password.ok_or_else(|| missing("minio::password"))?,
            bucket: minio.bucket.ok_or_else(|| missing("minio::bucket"))?,
        };

        let config = AgentConfig {
            root: root.to_path_buf(),
            database_path: resolve_database_path(root, &database),
            metadata_service,
            object_store,
            sync: raw.sync,
            logging: raw.logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::Config("Watched folder path cannot be empty".to_string()));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.metadata_service.host.trim().is_empty() {
            return Err(Error::Config("network::host cannot be empty".to_string()));
        }

        if self.metadata_service.port == 0 {
            return Err(Error::Config("network::port must be between 1 and 65535".to_string()));
        }

        if self.object_store.host.trim().is_empty() {
            return Err(Error::Config("minio::host cannot be empty".to_string()));
        }

        if self.object_store.port == 0 {
            return Err(Error::Config("minio::port must be between 1 and 65535".to_string()));
        }

        if self.object_store.bucket.trim().is_empty() {
            return Err(Error::Config("minio::bucket cannot be empty".to_string()));
        }

        let retry = &self.sync.retry;
        if retry.max_attempts == 0 {
            return Err(Error::Config(
                "sync::retry::max_attempts must be at least 1".to_string(),
            ));
        }

        if retry.initial_backoff_ms == 0 {
            return Err(Error::Config(
                "sync::retry::initial_backoff_ms must be greater than 0".to_string(),
            ));
        }

        if retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err(Error::Config(
                "sync::retry::max_backoff_ms must not be lower than initial_backoff_ms"
                    .to_string(),
            ));
        }

        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(Error::Config(
                "sync::retry::multiplier must be a finite number >= 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// `database` is resolved inside the control directory, with `.db` appended
/// when the name carries no such extension.
fn resolve_database_path(root: &Path, database: &str) -> PathBuf {
    let mut name = database.trim().to_string();
    if !name.contains(".db") {
        name.push_str(".db");
    }
    root.join(CONTROL_DIR).join(name)
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    database: Option<String>,
    network: Option<RawEndpoint>,
    minio: Option<RawMinio>,
    #[serde(default)]
    sync: SyncSettings,
    #[serde(default)]
    logging: LogSettings,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    host: Option<String>,
    port: Option<PortValue>,
}

#[derive(Debug, Deserialize)]
struct RawMinio {
    host: Option<String>,
    port: Option<PortValue>,
    id: Option<String>,
    password: Option<String>,
    bucket: Option<String>,
}

/// Ports may be written as YAML numbers or quoted strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    fn into_port(self, key: &str, origin: &Path) -> Result<u16> {
        let not_numeric = || {
            Error::Config(format!(
                "Please check \"{}\" value is number in yaml: {}",
                key,
                origin.display()
            ))
        };

        match self {
            PortValue::Number(n) => u16::try_from(n).map_err(|_| not_numeric()),
            PortValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                    return Err(not_numeric());
                }
                s.parse::<u16>().map_err(|_| not_numeric())
            }
        }
    }
}

/// Builder for constructing [`AgentConfig`] instances.
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    root: Option<PathBuf>,
    database_path: Option<PathBuf>,
    metadata_service: Option<EndpointConfig>,
    object_store: Option<ObjectStoreSettings>,
    sync: SyncSettings,
    logging: LogSettings,
}

impl AgentConfigBuilder {
    /// Sets the watched folder.
    pub fn root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Sets the database path. Defaults to `<root>/.ignore/local.db`.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the remote metadata service endpoint (required).
    pub fn metadata_service(mut self, host: impl Into<String>, port: u16) -> Self {
        self.metadata_service = Some(EndpointConfig {
            host: host.into(),
            port,
        });
        self
    }

    /// Sets the object store endpoint and credentials (required).
    pub fn object_store(
        mut self,
        host: impl Into<String>,
        port: u16,
        access_id: impl Into<String>,
        secret: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        self.object_store = Some(ObjectStoreSettings {
            host: host.into(),
            port,
            access_id: access_id.into(),
            secret: secret.into(),
            bucket: bucket.into(),
        });
        self
    }

    /// Sets the queue capacity. 0 selects an unbounded queue.
    ///
    /// Default: 1024
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.sync.queue_capacity = capacity;
        self
    }

    /// Sets the debounce window in milliseconds.
    ///
    /// Default: 0 (disabled)
    pub fn debounce_ms(mut self, window_ms: u64) -> Self {
        self.sync.debounce_ms = window_ms;
        self
    }

    /// Sets the retry schedule.
    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.sync.retry = retry;
        self
    }

    /// Adds a glob pattern to exclude.
    pub fn ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.sync.ignore.push(pattern.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.logging.level = level;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    /// Builds the final `AgentConfig`, validating it.
    pub fn build(self) -> Result<AgentConfig> {
        let root = self.root.ok_or_else(|| {
            Error::Config("Watched folder is required. Use .root() to set it.".to_string())
        })?;

        let metadata_service = self.metadata_service.ok_or_else(|| {
            Error::Config(
                "Metadata service endpoint is required. Use .metadata_service() to set it."
                    .to_string(),
            )
        })?;

        let object_store = self.object_store.ok_or_else(|| {
            Error::Config(
                "Object store settings are required. Use .object_store() to set them."
                    .to_string(),
            )
        })?;

        let database_path = self
            .database_path
            .unwrap_or_else(|| resolve_database_path(&root, "local"));

        let config = AgentConfig {
            root,
            database_path,
            metadata_service,
            object_store,
            sync: self.sync,
            logging: self.logging,
        };

        config.validate()?;
        Ok(config)
    }
}
