//! SQLite backend.
//!
//! SQLite exposes no per-row transaction marker, so rows carry a `version`
//! column. Versions come from a one-row counter table that is bumped inside
//! the same transaction as the write. The counter never goes backwards, so
//! a key that is deleted and re-created never gets an ETag it had before.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Connection;
use tracing::{debug, info};

use crate::access::{validate_batch, StateAccess};
use crate::config::StateConfig;
use crate::error::StateResult;
use crate::etag::Revision;
use crate::outcome::{backend_fault, settle, single_row};
use crate::schema;
use crate::types::{DeleteRequest, GetRequest, GetResponse, SetRequest};

#[derive(Debug)]
struct Statements {
    next_version: String,
    get: String,
    upsert: String,
    update_if: String,
    delete: String,
    delete_if: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let revision = schema::revision_table(table);
        Self {
            next_version: format!("UPDATE {revision} SET last = last + 1 WHERE id = 1 RETURNING last"),
            get: format!("SELECT value, version FROM {table} WHERE key = ?1"),
            upsert: format!(
                "INSERT INTO {table} (key, value, version) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET
                     value = excluded.value,
                     version = excluded.version,
                     updatedate = CURRENT_TIMESTAMP"
            ),
            update_if: format!(
                "UPDATE {table} SET value = ?1, version = ?2, updatedate = CURRENT_TIMESTAMP
                 WHERE key = ?3 AND version = ?4"
            ),
            delete: format!("DELETE FROM {table} WHERE key = ?1"),
            delete_if: format!("DELETE FROM {table} WHERE key = ?1 AND version = ?2"),
        }
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// State store over a SQLite database file or an in-memory database.
#[derive(Clone)]
pub struct SqliteStateAccess {
    pool: SqlitePool,
    table: String,
    sql: Arc<Statements>,
}

impl SqliteStateAccess {
    /// Open (or create) the database and make sure the tables exist.
    pub async fn connect(config: &StateConfig) -> StateResult<Self> {
        config.validate()?;
        let options = SqliteConnectOptions::from_str(&config.connection_string)
            .map_err(backend_fault)?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so keep exactly
        // one connection and never recycle it.
        let pool_options = if is_in_memory(&config.connection_string) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.pool.max_connections)
        };
        let pool = pool_options
            .acquire_timeout(config.pool.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(backend_fault)?;
        Self::from_pool(pool, &config.table_name).await
    }

    /// Ephemeral store for tests and local tooling.
    pub async fn open_in_memory() -> StateResult<Self> {
        Self::connect(&StateConfig::new("sqlite::memory:")).await
    }

    pub async fn from_pool(pool: SqlitePool, table_name: &str) -> StateResult<Self> {
        schema::validate_table_name(table_name)?;
        let store = Self {
            sql: Arc::new(Statements::new(table_name)),
            table: table_name.to_string(),
            pool,
        };

        let mut conn = store.pool.acquire().await.map_err(backend_fault)?;
        conn.ping().await.map_err(backend_fault)?;
        drop(conn);

        store.ensure_table().await?;
        info!(table = %store.table, "sqlite state store ready");
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_table(&self) -> StateResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend_fault)?;
        let exists: i64 = sqlx::query_scalar(schema::SQLITE_TABLE_EXISTS)
            .bind(&self.table)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend_fault)?;
        if exists == 0 {
            let ddl = schema::sqlite_create_table(&self.table);
            sqlx::query(&ddl)
                .execute(&mut *tx)
                .await
                .map_err(backend_fault)?;
            info!(table = %self.table, "created state table");
        }
        let ddl = schema::sqlite_create_revision_table(&self.table);
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(backend_fault)?;
        let seed = schema::sqlite_seed_revision(&self.table);
        sqlx::query(&seed)
            .execute(&mut *tx)
            .await
            .map_err(backend_fault)?;
        tx.commit().await.map_err(backend_fault)
    }
}

async fn next_version(conn: &mut SqliteConnection, sql: &Statements) -> StateResult<i64> {
    sqlx::query_scalar(&sql.next_version)
        .fetch_one(&mut *conn)
        .await
        .map_err(backend_fault)
}

async fn apply_set(
    conn: &mut SqliteConnection,
    sql: &Statements,
    req: &SetRequest,
) -> StateResult<()> {
    let revision = req.validate()?;
    let document = req.document()?;
    let version = next_version(conn, sql).await?;
    let result = match revision {
        None => {
            sqlx::query(&sql.upsert)
                .bind(&req.key)
                .bind(&document)
                .bind(version)
                .execute(&mut *conn)
                .await
        }
        Some(rev) => {
            sqlx::query(&sql.update_if)
                .bind(&document)
                .bind(version)
                .bind(&req.key)
                .bind(rev.value())
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(backend_fault)?;
    single_row(&req.key, result.rows_affected())
}

async fn apply_delete(
    conn: &mut SqliteConnection,
    sql: &Statements,
    req: &DeleteRequest,
) -> StateResult<()> {
    let revision = req.validate()?;
    let result = match revision {
        None => {
            sqlx::query(&sql.delete)
                .bind(&req.key)
                .execute(&mut *conn)
                .await
        }
        Some(rev) => {
            sqlx::query(&sql.delete_if)
                .bind(&req.key)
                .bind(rev.value())
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(backend_fault)?;
    single_row(&req.key, result.rows_affected())
}

async fn apply_batch(
    conn: &mut SqliteConnection,
    sql: &Statements,
    deletes: &[DeleteRequest],
    sets: &[SetRequest],
) -> StateResult<()> {
    for req in deletes {
        apply_delete(conn, sql, req).await?;
    }
    for req in sets {
        apply_set(conn, sql, req).await?;
    }
    Ok(())
}

impl StateAccess for SqliteStateAccess {
    async fn get(&self, req: &GetRequest) -> StateResult<GetResponse> {
        req.validate()?;
        debug!(key = %req.key, "getting state value from sqlite");
        let row: Option<(String, i64)> = sqlx::query_as(&self.sql.get)
            .bind(&req.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_fault)?;

        Ok(match row {
            Some((value, version)) => GetResponse {
                data: value.into_bytes(),
                etag: Some(Revision::new(version).to_string()),
                metadata: req.metadata.clone(),
            },
            None => GetResponse::default(),
        })
    }

    async fn set(&self, req: &SetRequest) -> StateResult<()> {
        debug!(key = %req.key, conditional = req.etag.is_some(), "setting state value in sqlite");
        req.validate()?;
        let mut tx = self.pool.begin().await.map_err(backend_fault)?;
        let outcome = apply_set(&mut tx, &self.sql, req).await;
        settle(tx, outcome).await
    }

    async fn delete(&self, req: &DeleteRequest) -> StateResult<()> {
        debug!(key = %req.key, conditional = req.etag.is_some(), "deleting state value from sqlite");
        req.validate()?;
        let mut conn = self.pool.acquire().await.map_err(backend_fault)?;
        apply_delete(&mut conn, &self.sql, req).await
    }

    async fn execute_batch(&self, deletes: &[DeleteRequest], sets: &[SetRequest]) -> StateResult<()> {
        validate_batch(deletes, sets)?;
        if deletes.is_empty() && sets.is_empty() {
            return Ok(());
        }
        debug!(deletes = deletes.len(), sets = sets.len(), "executing sqlite batch");
        let mut tx = self.pool.begin().await.map_err(backend_fault)?;
        let outcome = apply_batch(&mut tx, &self.sql, deletes, sets).await;
        settle(tx, outcome).await
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!(table = %self.table, "sqlite pool closed");
        }
    }
}
