//! Affected-row normalization.
//!
//! Every keyed mutation is a single conditional statement, and the number
//! of rows it touched is the only outcome signal: stale ETags, deleted
//! keys and lost races all show up as zero rows.

use tracing::{error, warn};

use crate::error::{StateError, StateResult};

/// Log and wrap a driver fault. Backend errors are surfaced verbatim.
pub(crate) fn backend_fault(err: sqlx::Error) -> StateError {
    error!(error = %err, "state backend fault");
    StateError::Backend(err)
}

/// Commit when every statement reported success, otherwise roll back and
/// return the first failure.
pub(crate) async fn settle<DB: sqlx::Database>(
    tx: sqlx::Transaction<'_, DB>,
    outcome: StateResult<()>,
) -> StateResult<()> {
    match outcome {
        Ok(()) => tx.commit().await.map_err(backend_fault),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Require that a keyed mutation affected exactly one row.
pub fn single_row(key: &str, rows_affected: u64) -> StateResult<()> {
    match rows_affected {
        1 => Ok(()),
        0 => {
            warn!(%key, "no rows match given key and etag");
            Err(StateError::NotFoundOrConflict {
                key: key.to_string(),
            })
        }
        rows => {
            error!(%key, rows, "more than one row affected, expected one");
            Err(StateError::InvariantViolation {
                key: key.to_string(),
                rows,
            })
        }
    }
}
