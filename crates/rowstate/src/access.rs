//! The `StateAccess` interface consumed by the host runtime.

use std::future::Future;

use crate::error::StateResult;
use crate::types::{DeleteRequest, GetRequest, GetResponse, SetRequest};

/// CRUD plus atomic batches over a single state table, with optimistic
/// concurrency through ETags.
///
/// Every mutation must affect exactly one row. Zero rows (absent key or
/// stale ETag) is [`StateError::NotFoundOrConflict`](crate::StateError),
/// more than one is [`StateError::InvariantViolation`](crate::StateError).
pub trait StateAccess: Send + Sync {
    /// Look up a key. A missing row yields an empty response, not an error.
    fn get(&self, req: &GetRequest) -> impl Future<Output = StateResult<GetResponse>> + Send;

    /// Upsert without an ETag; conditional update (never insert) with one.
    fn set(&self, req: &SetRequest) -> impl Future<Output = StateResult<()>> + Send;

    /// Delete, conditionally when an ETag is supplied. Deleting an absent
    /// key is an error.
    fn delete(&self, req: &DeleteRequest) -> impl Future<Output = StateResult<()>> + Send;

    /// Apply `deletes` then `sets`, in order, in one transaction. The first
    /// failure rolls everything back and is returned.
    fn execute_batch(
        &self,
        deletes: &[DeleteRequest],
        sets: &[SetRequest],
    ) -> impl Future<Output = StateResult<()>> + Send;

    /// Release the connection pool.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Validate a whole batch up front so malformed input never opens a
/// transaction.
pub(crate) fn validate_batch(deletes: &[DeleteRequest], sets: &[SetRequest]) -> StateResult<()> {
    for req in deletes {
        req.validate()?;
    }
    for req in sets {
        req.validate()?;
    }
    Ok(())
}
