//! StateStore — backend selection and initialization.
//!
//! The host runtime builds one `StateStore` at startup from its component
//! metadata, shares clones of it across tasks, and closes it once at
//! shutdown. Initialization validates the config, opens the pool, pings the
//! server and creates the state table if it is absent; any failure there is
//! fatal and the store never becomes ready.

use std::collections::HashMap;

use tracing::info;

use crate::access::StateAccess;
use crate::config::{Backend, StateConfig};
use crate::error::StateResult;
use crate::postgres::PostgresStateAccess;
use crate::sqlite::SqliteStateAccess;
use crate::types::{DeleteRequest, GetRequest, GetResponse, SetRequest};

/// A ready state store over one of the supported backends.
#[derive(Clone)]
pub enum StateStore {
    Postgres(PostgresStateAccess),
    Sqlite(SqliteStateAccess),
}

impl StateStore {
    /// Connect using the backend named by the connection string scheme.
    pub async fn connect(config: &StateConfig) -> StateResult<Self> {
        config.validate()?;
        let backend = config.backend()?;
        info!(%backend, table = %config.table_name, "state store initializing");
        Ok(match backend {
            Backend::Postgres => StateStore::Postgres(PostgresStateAccess::connect(config).await?),
            Backend::Sqlite => StateStore::Sqlite(SqliteStateAccess::connect(config).await?),
        })
    }

    /// Connect from component metadata properties (`connectionString`, ...).
    pub async fn from_metadata(properties: &HashMap<String, String>) -> StateResult<Self> {
        let config = StateConfig::from_metadata(properties)?;
        Self::connect(&config).await
    }

    /// Create an ephemeral in-memory store (for testing).
    pub async fn open_in_memory() -> StateResult<Self> {
        Ok(StateStore::Sqlite(SqliteStateAccess::open_in_memory().await?))
    }

    pub fn backend(&self) -> Backend {
        match self {
            StateStore::Postgres(_) => Backend::Postgres,
            StateStore::Sqlite(_) => Backend::Sqlite,
        }
    }
}

impl StateAccess for StateStore {
    async fn get(&self, req: &GetRequest) -> StateResult<GetResponse> {
        match self {
            StateStore::Postgres(inner) => inner.get(req).await,
            StateStore::Sqlite(inner) => inner.get(req).await,
        }
    }

    async fn set(&self, req: &SetRequest) -> StateResult<()> {
        match self {
            StateStore::Postgres(inner) => inner.set(req).await,
            StateStore::Sqlite(inner) => inner.set(req).await,
        }
    }

    async fn delete(&self, req: &DeleteRequest) -> StateResult<()> {
        match self {
            StateStore::Postgres(inner) => inner.delete(req).await,
            StateStore::Sqlite(inner) => inner.delete(req).await,
        }
    }

    async fn execute_batch(&self, deletes: &[DeleteRequest], sets: &[SetRequest]) -> StateResult<()> {
        match self {
            StateStore::Postgres(inner) => inner.execute_batch(deletes, sets).await,
            StateStore::Sqlite(inner) => inner.execute_batch(deletes, sets).await,
        }
    }

    async fn close(&self) {
        match self {
            StateStore::Postgres(inner) => inner.close().await,
            StateStore::Sqlite(inner) => inner.close().await,
        }
    }
}
