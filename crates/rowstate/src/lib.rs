//! rowstate — key-value state store with optimistic concurrency.
//!
//! Stores JSON documents by key in a single relational table and exposes
//! them through [`StateAccess`]: get, set, delete and atomic batches.
//!
//! # Concurrency
//!
//! Every read returns an ETag, the decimal form of the row's current
//! revision. Passing that ETag back on a write turns it into a conditional
//! statement (`WHERE key = ? AND revision = ?`), and the affected-row count
//! decides the outcome: one row is success, zero rows is
//! [`StateError::NotFoundOrConflict`], more is
//! [`StateError::InvariantViolation`]. No in-process locks are taken.
//!
//! # Backends
//!
//! - PostgreSQL, using the `xmin` system column as the revision.
//! - SQLite, using an explicit `version` column fed by a counter table.
//!
//! Both share one pool per store; [`StateStore`] is `Clone` and can be
//! handed to any number of tasks.

pub mod access;
pub mod config;
pub mod error;
pub mod etag;
pub mod outcome;
pub mod postgres;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod types;

pub use access::StateAccess;
pub use config::{Backend, PoolSettings, StateConfig};
pub use error::{StateError, StateResult};
pub use etag::Revision;
pub use postgres::PostgresStateAccess;
pub use sqlite::SqliteStateAccess;
pub use store::StateStore;
pub use types::*;
