//! PostgreSQL backend.
//!
//! The ETag is the system column `xmin`, the id of the transaction that
//! wrote the current row version. PostgreSQL refreshes it on every update,
//! so the store never has to maintain a version column itself.
//!
//! `xmin` is an `xid`, which has no binary mapping in sqlx; it is read and
//! compared through `xmin::text::bigint`.

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use tracing::{debug, info};

use crate::access::{validate_batch, StateAccess};
use crate::config::StateConfig;
use crate::error::StateResult;
use crate::etag::Revision;
use crate::outcome::{backend_fault, settle, single_row};
use crate::schema;
use crate::types::{DeleteRequest, GetRequest, GetResponse, SetRequest};

/// SQL text for one table, rendered once at startup.
#[derive(Debug)]
struct Statements {
    get: String,
    upsert: String,
    update_if: String,
    delete: String,
    delete_if: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        Self {
            get: format!("SELECT value::text, xmin::text::bigint FROM {table} WHERE key = $1"),
            upsert: format!(
                "INSERT INTO {table} (key, value) VALUES ($1, $2::json)
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updatedate = NOW()"
            ),
            update_if: format!(
                "UPDATE {table} SET value = $1::json, updatedate = NOW()
                 WHERE key = $2 AND xmin::text::bigint = $3"
            ),
            delete: format!("DELETE FROM {table} WHERE key = $1"),
            delete_if: format!("DELETE FROM {table} WHERE key = $1 AND xmin::text::bigint = $2"),
        }
    }
}

/// State store over a shared PostgreSQL pool.
///
/// Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct PostgresStateAccess {
    pool: PgPool,
    table: String,
    sql: std::sync::Arc<Statements>,
}

impl PostgresStateAccess {
    /// Open the pool, check connectivity and make sure the table exists.
    pub async fn connect(config: &StateConfig) -> StateResult<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.acquire_timeout())
            .connect(&config.connection_string)
            .await
            .map_err(backend_fault)?;
        Self::from_pool(pool, &config.table_name).await
    }

    /// Wrap an existing pool. Pings the server and bootstraps the table.
    pub async fn from_pool(pool: PgPool, table_name: &str) -> StateResult<Self> {
        schema::validate_table_name(table_name)?;
        // Unquoted identifiers fold to lower case, and pg_tables stores the
        // folded name.
        let table = table_name.to_ascii_lowercase();
        let store = Self {
            sql: std::sync::Arc::new(Statements::new(&table)),
            table,
            pool,
        };

        let mut conn = store.pool.acquire().await.map_err(backend_fault)?;
        conn.ping().await.map_err(backend_fault)?;
        drop(conn);

        store.ensure_table().await?;
        info!(table = %store.table, "postgres state store ready");
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the state table when `pg_tables` does not list it.
    ///
    /// Two processes starting against a fresh database can both see the
    /// table as missing. `IF NOT EXISTS` does not fully cover that: the
    /// loser may still fail on the `pg_type` unique index. Either duplicate
    /// error means another process created the table, so it counts as done.
    async fn ensure_table(&self) -> StateResult<()> {
        let exists: bool = sqlx::query_scalar(schema::PG_TABLE_EXISTS)
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(backend_fault)?;
        if exists {
            return Ok(());
        }
        let ddl = schema::pg_create_table(&self.table);
        match sqlx::query(&ddl).execute(&self.pool).await {
            Ok(_) => info!(table = %self.table, "created state table"),
            Err(err) if created_concurrently(&err) => {
                debug!(table = %self.table, "state table created by another process")
            }
            Err(err) => return Err(backend_fault(err)),
        }
        Ok(())
    }
}

/// `unique_violation` (from `pg_type`) or `duplicate_table`.
fn is_duplicate_object(code: Option<&str>) -> bool {
    matches!(code, Some("23505") | Some("42P07"))
}

fn created_concurrently(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => is_duplicate_object(db.code().as_deref()),
        _ => false,
    }
}

async fn apply_set(conn: &mut PgConnection, sql: &Statements, req: &SetRequest) -> StateResult<()> {
    let revision = req.validate()?;
    let document = req.document()?;
    let result = match revision {
        None => {
            sqlx::query(&sql.upsert)
                .bind(&req.key)
                .bind(&document)
                .execute(&mut *conn)
                .await
        }
        Some(rev) => {
            sqlx::query(&sql.update_if)
                .bind(&document)
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
    conn: &mut PgConnection,
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
    conn: &mut PgConnection,
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

impl StateAccess for PostgresStateAccess {
    async fn get(&self, req: &GetRequest) -> StateResult<GetResponse> {
        req.validate()?;
        debug!(key = %req.key, "getting state value from postgres");
        let row: Option<(String, i64)> = sqlx::query_as(&self.sql.get)
            .bind(&req.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_fault)?;

        Ok(match row {
            Some((value, xmin)) => GetResponse {
                data: value.into_bytes(),
                etag: Some(Revision::new(xmin).to_string()),
                metadata: req.metadata.clone(),
            },
            None => GetResponse::default(),
        })
    }

    async fn set(&self, req: &SetRequest) -> StateResult<()> {
        debug!(key = %req.key, conditional = req.etag.is_some(), "setting state value in postgres");
        req.validate()?;
        let mut conn = self.pool.acquire().await.map_err(backend_fault)?;
        apply_set(&mut conn, &self.sql, req).await
    }

    async fn delete(&self, req: &DeleteRequest) -> StateResult<()> {
        debug!(key = %req.key, conditional = req.etag.is_some(), "deleting state value from postgres");
        req.validate()?;
        let mut conn = self.pool.acquire().await.map_err(backend_fault)?;
        apply_delete(&mut conn, &self.sql, req).await
    }

    async fn execute_batch(&self, deletes: &[DeleteRequest], sets: &[SetRequest]) -> StateResult<()> {
        validate_batch(deletes, sets)?;
        if deletes.is_empty() && sets.is_empty() {
            return Ok(());
        }
        debug!(deletes = deletes.len(), sets = sets.len(), "executing postgres batch");
        let mut tx = self.pool.begin().await.map_err(backend_fault)?;
        let outcome = apply_batch(&mut tx, &self.sql, deletes, sets).await;
        settle(tx, outcome).await
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!(table = %self.table, "postgres pool closed");
        }
    }
}
