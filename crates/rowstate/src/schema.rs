//! Backing table layout and bootstrap statements.
//!
//! Both backends use one table:
//!
//! | column       | postgres                  | sqlite                 |
//! |--------------|---------------------------|------------------------|
//! | `key`        | `varchar(200)` primary key| `TEXT` primary key     |
//! | `value`      | `json`                    | `TEXT` (JSON document) |
//! | `insertdate` | `timestamptz`, now        | `TEXT`, now            |
//! | `updatedate` | `timestamptz`, nullable   | `TEXT`, nullable       |
//! | `version`    | (system column `xmin`)    | `INTEGER`              |
//!
//! SQLite has no implicit row version, so it also gets a one-row
//! `<table>_revision` counter that hands out versions.
//!
//! The table name is interpolated into SQL text and must be a plain
//! identifier.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{StateError, StateResult};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

/// Reject table names that are not plain SQL identifiers.
pub fn validate_table_name(name: &str) -> StateResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(StateError::Config(format!("invalid table name {name:?}")))
    }
}

// ── PostgreSQL ─────────────────────────────────────────────────────

pub(crate) const PG_TABLE_EXISTS: &str =
    "SELECT EXISTS (SELECT FROM pg_tables WHERE tablename = $1)";

pub(crate) fn pg_create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            key varchar(200) NOT NULL PRIMARY KEY,
            value json NOT NULL,
            insertdate TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            updatedate TIMESTAMP WITH TIME ZONE NULL
        )"
    )
}

// ── SQLite ─────────────────────────────────────────────────────────

pub(crate) const SQLITE_TABLE_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

pub(crate) fn revision_table(table: &str) -> String {
    format!("{table}_revision")
}

pub(crate) fn sqlite_create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            key TEXT NOT NULL PRIMARY KEY,
            value TEXT NOT NULL,
            version INTEGER NOT NULL,
            insertdate TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updatedate TEXT NULL
        )"
    )
}

pub(crate) fn sqlite_create_revision_table(table: &str) -> String {
    let revision = revision_table(table);
    format!(
        "CREATE TABLE IF NOT EXISTS {revision} (
            id INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
            last INTEGER NOT NULL
        )"
    )
}

pub(crate) fn sqlite_seed_revision(table: &str) -> String {
    let revision = revision_table(table);
    format!("INSERT OR IGNORE INTO {revision} (id, last) VALUES (1, 0)")
}
