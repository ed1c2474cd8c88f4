//! Request and response types for the rowstate store.
//!
//! These mirror what the host runtime hands to a state component: a key,
//! an optional ETag taken from an earlier read, and for writes a JSON
//! payload. ETags travel as strings and are only parsed on validation.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::etag::Revision;

/// Free-form request metadata, echoed back on reads.
pub type Metadata = HashMap<String, String>;

fn require_key(key: &str, operation: &str) -> StateResult<()> {
    if key.is_empty() {
        return Err(StateError::InvalidArgument(format!(
            "missing key in {operation} operation"
        )));
    }
    Ok(())
}

// ── Get ────────────────────────────────────────────────────────────

/// Single-key lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GetRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach metadata to be echoed back in the response.
    pub fn with_metadata(self, metadata: Metadata) -> Self {
        Self { metadata, ..self }
    }

    pub fn validate(&self) -> StateResult<()> {
        require_key(&self.key, "get")
    }
}

/// Result of a lookup. A miss is an empty response, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResponse {
    /// Stored JSON document, as bytes.
    pub data: Vec<u8>,
    pub etag: Option<String>,
    pub metadata: Metadata,
}

impl GetResponse {
    /// True when no record exists for the requested key.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.etag.is_none()
    }

    /// Decode the stored document. Returns `None` for a miss.
    pub fn json<T: DeserializeOwned>(&self) -> StateResult<Option<T>> {
        if self.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&self.data)
            .map(Some)
            .map_err(|e| StateError::InvalidArgument(format!("stored value is not valid JSON: {e}")))
    }
}

// ── Set ────────────────────────────────────────────────────────────

/// Create or update a record.
///
/// Without an ETag this is an upsert. With an ETag it only updates an
/// existing row whose current revision matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl SetRequest {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            etag: None,
        }
    }

    /// Build a request from any serializable payload.
    pub fn with_payload<T: Serialize + ?Sized>(
        key: impl Into<String>,
        payload: &T,
    ) -> StateResult<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| StateError::InvalidArgument(format!("unserializable payload: {e}")))?;
        Ok(Self::new(key, value))
    }

    pub fn with_etag(self, etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
            ..self
        }
    }

    /// Check the key and parse the ETag, if any.
    pub fn validate(&self) -> StateResult<Option<Revision>> {
        require_key(&self.key, "set")?;
        Revision::parse_optional(self.etag.as_deref())
    }

    /// The payload as the JSON text written to the value column.
    pub(crate) fn document(&self) -> StateResult<String> {
        serde_json::to_string(&self.value)
            .map_err(|e| StateError::InvalidArgument(format!("unserializable payload: {e}")))
    }
}

// ── Delete ─────────────────────────────────────────────────────────

/// Remove a record, optionally only if its revision matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl DeleteRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            etag: None,
        }
    }

    pub fn with_etag(self, etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
            ..self
        }
    }

    pub fn validate(&self) -> StateResult<Option<Revision>> {
        require_key(&self.key, "delete")?;
        Revision::parse_optional(self.etag.as_deref())
    }
}

// ── Batch ──────────────────────────────────────────────────────────

/// A batch as read from a file or the wire: deletes run before sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub deletes: Vec<DeleteRequest>,
    #[serde(default)]
    pub sets: Vec<SetRequest>,
}

impl BatchRequest {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.sets.is_empty()
    }
}
