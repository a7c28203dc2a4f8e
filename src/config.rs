//! Server Configuration
//!
//! A TOML file declares the data directory, the collections and their
//! schemas, the listen address and logging. `INSIGHTFUL_*` variables win
//! over whatever the file says.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::api::ApiConfig as ServerConfig;
use crate::query::DEFAULT_LIST_LIMIT;
use crate::schema::{Schema, SchemaError, Validator};
use crate::storage::{
    CollectionSpec, LogSyncMode, StorageConfig as EngineConfig, DEFAULT_TIMESTAMP_FIELD,
};

/// Everything the server binary needs to start
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[storage]`: where collections live and how writes are synced
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub log_sync: LogSyncMode,

    #[serde(default = "default_sync_snapshot")]
    pub sync_snapshot: bool,

    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("insightful").to_string_lossy().to_string())
        .unwrap_or_else(|| "./insightful_data".to_string())
}

fn default_sync_snapshot() -> bool {
    true
}

fn default_collections() -> Vec<CollectionConfig> {
    vec![CollectionConfig::named("events")]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_sync: LogSyncMode::default(),
            sync_snapshot: default_sync_snapshot(),
            collections: default_collections(),
        }
    }
}

/// One `[[storage.collections]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    pub name: String,

    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Start from the built-in `events` schema
    #[serde(default = "default_builtin_schema")]
    pub builtin_schema: bool,

    /// JSON schema document merged on top
    pub schema_file: Option<String>,
}

fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.to_string()
}

fn default_builtin_schema() -> bool {
    true
}

impl CollectionConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp_field: default_timestamp_field(),
            builtin_schema: default_builtin_schema(),
            schema_file: None,
        }
    }

    /// The collection's effective schema; `None` when it accepts any object
    ///
    /// The timestamp field is always required when a schema is in force.
    pub fn schema(&self) -> Result<Option<Schema>, ConfigError> {
        let base = if self.builtin_schema {
            Some(Schema::events()?)
        } else {
            None
        };
        let custom = match &self.schema_file {
            Some(path) => Some(Schema::load(Path::new(path))?),
            None => None,
        };

        let mut schema = match (base, custom) {
            (Some(base), Some(custom)) => base.merge(custom),
            (Some(schema), None) | (None, Some(schema)) => schema,
            (None, None) => return Ok(None),
        };

        if !schema.require(&self.timestamp_field) {
            return Err(ConfigError::Invalid(format!(
                "collection '{}': timestamp field '{}' is not declared in its schema",
                self.name, self.timestamp_field
            )));
        }
        if !schema.field(&self.timestamp_field).map_or(false, |f| f.isodate) {
            return Err(ConfigError::Invalid(format!(
                "collection '{}': timestamp field '{}' must be declared isodate",
                self.name, self.timestamp_field
            )));
        }
        Ok(Some(schema))
    }
}

/// `[api]`: listen address and request limits
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// `[query]`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_list_limit: default_list_limit(),
        }
    }
}

/// `[logging]`: tracing filter level and output format
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Read and parse one TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Defaults plus `INSIGHTFUL_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// A file plus `INSIGHTFUL_*` variables
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path).map(|mut config| {
            config.apply_env_overrides();
            config
        })
    }

    /// The first readable file among the user config dir and the working
    /// directory, falling back to [`Config::from_env`]
    pub fn load_default() -> Self {
        let candidates = [
            dirs::config_dir().map(|dir| dir.join("insightful").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for candidate in candidates.iter().flatten().filter(|p| p.exists()) {
            match Self::load_with_env(candidate) {
                Ok(config) => {
                    tracing::info!(path = %candidate.display(), "Using config file");
                    return config;
                }
                Err(e) => tracing::warn!(path = %candidate.display(), "Skipping config: {}", e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("INSIGHTFUL_{}", name)).ok();

        if let Some(dir) = var("DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Some(host) = var("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("API_PORT").and_then(|raw| raw.parse().ok()) {
            self.api.port = port;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Engine configuration, with each collection's schema skeleton
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut collections = Vec::with_capacity(self.storage.collections.len());
        for collection in &self.storage.collections {
            let skeleton = collection
                .schema()?
                .map(|schema| schema.skeleton())
                .unwrap_or_default();
            collections.push(
                CollectionSpec::new(&collection.name)
                    .timestamp_field(&collection.timestamp_field)
                    .skeleton(skeleton),
            );
        }

        Ok(EngineConfig {
            data_dir: PathBuf::from(&self.storage.data_dir),
            log_sync: self.storage.log_sync,
            sync_snapshot: self.storage.sync_snapshot,
            collections,
        })
    }

    /// One validator per collection that has a schema
    pub fn validators(&self) -> Result<HashMap<String, Validator>, ConfigError> {
        let mut validators = HashMap::new();
        for collection in &self.storage.collections {
            if let Some(schema) = collection.schema()? {
                validators.insert(collection.name.clone(), Validator::new(schema)?);
            }
        }
        Ok(validators)
    }

    /// HTTP server configuration
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.api.host.clone(),
            port: self.api.port,
            max_body_size: self.api.max_body_size,
            default_list_limit: self.query.default_list_limit,
        }
    }
}

/// Why a config could not be turned into a running server
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("cannot parse {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Commented template printed by `insightful config`
pub fn generate_default_config() -> String {
    r#"# Insightful Configuration
#
# Overridable from the environment:
# - INSIGHTFUL_DATA_DIR
# - INSIGHTFUL_API_HOST
# - INSIGHTFUL_API_PORT
# - INSIGHTFUL_LOG_LEVEL
# - INSIGHTFUL_LOG_FORMAT

[storage]
# Directory holding event logs, index snapshots and rejection logs
data_dir = "./insightful_data"

# Log sync strategy: every_write, batched or none
log_sync = "batched"

# Rewrite the index snapshot on every insert (otherwise on shutdown)
sync_snapshot = true

[[storage.collections]]
name = "events"

# Path whose values define a query's time window
timestamp_field = "event.when"

# Validate against the built-in events schema
builtin_schema = true

# Extra fields merged on top of the schema
# schema_file = "./custom-schema.json"

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 4000

# Maximum request body size in bytes
max_body_size = 10485760

[query]
# Page size of list queries that set no limit
default_list_limit = 100

[logging]
# trace, debug, info, warn or error
level = "info"

# pretty for terminals, json for log shippers
format = "pretty"
"#
    .to_string()
}
