use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::quota::{QuotaRecord, QuotaStore, StoreError, StoredRecord, VersionToken};

/// SQLite implementation of the quota record store.
///
/// The `etag` column carries the version token; conditional writes are a
/// single statement each, so SQLite's own locking decides races.
pub struct SqliteQuotaStore {
    pool: SqlitePool,
}

impl SqliteQuotaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_stored(row: QuotaRow) -> Result<StoredRecord, StoreError> {
        let period_start = DateTime::parse_from_rfc3339(&row.period_start)
            .map_err(|e| StoreError::Unavailable(format!("Corrupt period_start: {}", e)))?
            .with_timezone(&Utc);
        let used = u64::try_from(row.used)
            .map_err(|_| StoreError::Unavailable(format!("Corrupt used count: {}", row.used)))?;

        Ok(StoredRecord {
            record: QuotaRecord {
                identity: row.identity,
                used,
                period_start,
            },
            version: VersionToken::new(row.etag),
        })
    }

    fn used_column(record: &QuotaRecord) -> Result<i64, StoreError> {
        i64::try_from(record.used)
            .map_err(|_| StoreError::Unavailable(format!("Counter overflow: {}", record.used)))
    }
}

/// Internal row structure for SQLite queries
#[derive(sqlx::FromRow)]
struct QuotaRow {
    identity: String,
    used: i64,
    period_start: String,
    etag: String,
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn fetch(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError> {
        let row: Option<QuotaRow> = sqlx::query_as(
            "SELECT identity, used, period_start, etag FROM quota_records WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(Self::row_to_stored).transpose()
    }

    async fn create(&self, record: &QuotaRecord, version: &VersionToken) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO quota_records (identity, used, period_start, etag, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO NOTHING",
        )
        .bind(&record.identity)
        .bind(Self::used_column(record)?)
        .bind(record.period_start.to_rfc3339())
        .bind(version.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(record.identity.clone()));
        }
        Ok(())
    }

    async fn replace(
        &self,
        record: &QuotaRecord,
        expected: &VersionToken,
        next: &VersionToken,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE quota_records
             SET used = ?, period_start = ?, etag = ?, updated_at = ?
             WHERE identity = ? AND etag = ?",
        )
        .bind(Self::used_column(record)?)
        .bind(record.period_start.to_rfc3339())
        .bind(next.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&record.identity)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(record.identity.clone()));
        }
        Ok(())
    }
}
