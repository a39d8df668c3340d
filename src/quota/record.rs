use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque concurrency stamp issued by a store on every successful write
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A fresh random etag
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consumption counter for one identity in its current period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub identity: String,
    pub used: u64,
    pub period_start: DateTime<Utc>,
}

impl QuotaRecord {
    /// Record for an identity that has never been seen
    pub fn fresh(identity: &str, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            used: 0,
            period_start: now,
        }
    }

    /// Whether the period has elapsed at `now`. A boundary hit counts as elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>, period: Duration) -> bool {
        now.signed_duration_since(self.period_start) >= period
    }

    /// Apply the rollover rule: an expired record restarts at zero from `now`
    pub fn rolled_over(self, now: DateTime<Utc>, period: Duration) -> Self {
        if self.is_expired(now, period) {
            Self::fresh(&self.identity, now)
        } else {
            self
        }
    }

    pub fn resets_at(&self, period: Duration) -> DateTime<Utc> {
        self.period_start + period
    }
}

/// A record as persisted, together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record: QuotaRecord,
    pub version: VersionToken,
}

/// Result of reading an identity's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// Nothing stored yet; the write must be a create
    Fresh,
    /// Stored record; the write must be conditioned on its version
    Existing(StoredRecord),
}

impl From<Option<StoredRecord>> for ReadResult {
    fn from(value: Option<StoredRecord>) -> Self {
        match value {
            Some(stored) => ReadResult::Existing(stored),
            None => ReadResult::Fresh,
        }
    }
}
