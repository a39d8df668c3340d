use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::record::{QuotaRecord, StoredRecord, VersionToken};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Conditional write lost against a concurrent writer
    #[error("version conflict for identity {0}")]
    Conflict(String),

    #[error("quota store unavailable: {0}")]
    Unavailable(String),

    #[error("quota store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Keyed record store offering only single-record conditional writes.
///
/// Implementations must guarantee that at most one `create` succeeds per
/// identity and at most one `replace` succeeds per observed version token.
/// The caller issues the token for each write, so a write whose reply was
/// lost can later be recognised by the token it left behind.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Fetch the record for an identity. Absence is not an error.
    async fn fetch(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Create the record stamped with `version`; fails with `Conflict` if one
    /// already exists.
    async fn create(&self, record: &QuotaRecord, version: &VersionToken) -> Result<(), StoreError>;

    /// Replace the record with one stamped `next` if its stored version still
    /// equals `expected`.
    async fn replace(
        &self,
        record: &QuotaRecord,
        expected: &VersionToken,
        next: &VersionToken,
    ) -> Result<(), StoreError>;
}
