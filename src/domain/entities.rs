//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

/// A persisted news item. Identity and creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: i64,
    pub author: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl NewsRecord {
    /// Reject records that could not have come out of the store.
    pub fn validate_persisted(&self) -> Result<(), DomainError> {
        if self.id <= 0 {
            return Err(DomainError::invariant(format!(
                "news id must be positive, got {}",
                self.id
            )));
        }
        if self.created.unix_timestamp_nanos() == 0 {
            return Err(DomainError::invariant(format!(
                "news {} has a zero creation timestamp",
                self.id
            )));
        }
        Ok(())
    }
}
