//! ETag encoding.
//!
//! An ETag is the decimal text form of the backend's per-row revision
//! counter (`xmin` in PostgreSQL, the `version` column in SQLite). Callers
//! treat it as opaque; the store parses it back before comparing.

use std::fmt;
use std::str::FromStr;

use crate::error::{StateError, StateResult};

/// Parsed row revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Revision(i64);

impl Revision {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Parse a caller-supplied ETag.
    pub fn parse(token: &str) -> StateResult<Self> {
        token.parse()
    }

    /// Parse an optional ETag, treating an empty string as absent.
    pub fn parse_optional(token: Option<&str>) -> StateResult<Option<Self>> {
        match token {
            None | Some("") => Ok(None),
            Some(t) => Self::parse(t).map(Some),
        }
    }
}

impl FromStr for Revision {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Revision)
            .map_err(|e| StateError::InvalidArgument(format!("malformed etag {s:?}: {e}")))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
