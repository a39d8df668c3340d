use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::record::{QuotaRecord, StoredRecord, VersionToken};
use super::store::{QuotaStore, StoreError};

/// In-process quota store backed by a sharded concurrent map
#[derive(Default)]
pub struct MemoryQuotaStore {
    records: DashMap<String, StoredRecord>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a record unconditionally
    #[cfg(test)]
    pub fn insert(&self, record: QuotaRecord) -> VersionToken {
        let version = VersionToken::generate();
        self.records.insert(
            record.identity.clone(),
            StoredRecord {
                record,
                version: version.clone(),
            },
        );
        version
    }

    #[cfg(test)]
    pub fn get(&self, identity: &str) -> Option<StoredRecord> {
        self.records.get(identity).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn fetch(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.get(identity).map(|entry| entry.value().clone()))
    }

    async fn create(&self, record: &QuotaRecord, version: &VersionToken) -> Result<(), StoreError> {
        match self.records.entry(record.identity.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(record.identity.clone())),
            Entry::Vacant(slot) => {
                slot.insert(StoredRecord {
                    record: record.clone(),
                    version: version.clone(),
                });
                Ok(())
            }
        }
    }

    async fn replace(
        &self,
        record: &QuotaRecord,
        expected: &VersionToken,
        next: &VersionToken,
    ) -> Result<(), StoreError> {
        match self.records.get_mut(&record.identity) {
            Some(mut entry) if entry.version == *expected => {
                entry.record = record.clone();
                entry.version = next.clone();
                Ok(())
            }
            _ => Err(StoreError::Conflict(record.identity.clone())),
        }
    }
}
