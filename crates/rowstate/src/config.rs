//! Store configuration.
//!
//! A store is configured either from the host runtime's metadata map
//! (`connectionString`, `tableName`, ...) or from a TOML file:
//!
//! ```toml
//! connection_string = "postgres://app@db:5432/app"
//! table_name = "state"
//!
//! [pool]
//! max_connections = 10
//! acquire_timeout_secs = 30
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::schema;

pub const CONNECTION_STRING_KEY: &str = "connectionString";
pub const TABLE_NAME_KEY: &str = "tableName";
pub const MAX_CONNECTIONS_KEY: &str = "maxConnections";
pub const ACQUIRE_TIMEOUT_KEY: &str = "acquireTimeoutSecs";

pub const DEFAULT_TABLE_NAME: &str = "state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    pub connection_string: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Connection pool sizing, shared by every operation of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Which relational backend a connection string points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn detect(connection_string: &str) -> StateResult<Self> {
        if connection_string.starts_with("postgres://")
            || connection_string.starts_with("postgresql://")
        {
            Ok(Backend::Postgres)
        } else if connection_string.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            Err(StateError::Config(
                "unsupported connection string: expected postgres:// or sqlite: scheme".to_string(),
            ))
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Postgres => write!(f, "postgres"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl StateConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            table_name: default_table_name(),
            pool: PoolSettings::default(),
        }
    }

    /// Builder method: use a table other than `state`.
    pub fn with_table_name(self, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..self
        }
    }

    /// Builder method: set pool sizing.
    pub fn with_pool(self, pool: PoolSettings) -> Self {
        Self { pool, ..self }
    }

    /// Build a config from component metadata properties.
    pub fn from_metadata(properties: &HashMap<String, String>) -> StateResult<Self> {
        let connection_string = properties
            .get(CONNECTION_STRING_KEY)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StateError::Config("missing connection string".to_string()))?;

        let mut config = Self::new(connection_string.clone());
        if let Some(table) = properties.get(TABLE_NAME_KEY).filter(|v| !v.is_empty()) {
            config.table_name = table.clone();
        }
        if let Some(raw) = properties.get(MAX_CONNECTIONS_KEY) {
            config.pool.max_connections = parse_property(MAX_CONNECTIONS_KEY, raw)?;
        }
        if let Some(raw) = properties.get(ACQUIRE_TIMEOUT_KEY) {
            config.pool.acquire_timeout_secs = parse_property(ACQUIRE_TIMEOUT_KEY, raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: StateConfig = toml::from_str(&content)
            .map_err(|e| StateError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.connection_string.is_empty() {
            return Err(StateError::Config("missing connection string".to_string()));
        }
        if self.pool.max_connections == 0 {
            return Err(StateError::Config(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }
        schema::validate_table_name(&self.table_name)?;
        Backend::detect(&self.connection_string)?;
        Ok(())
    }

    pub fn backend(&self) -> StateResult<Backend> {
        Backend::detect(&self.connection_string)
    }
}

fn parse_property<T: std::str::FromStr>(name: &str, raw: &str) -> StateResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StateError::Config(format!("invalid {name} {raw:?}: {e}")))
}
