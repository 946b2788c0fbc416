use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KvClient, ScanPredicate, StoredRecord};
use crate::error::StoreError;

/// In-process store keyed by `(bucket, key)`.
///
/// Scans run the predicate locally. `set_offline` and `set_read_only` simulate
/// an unreachable cluster and a cluster that refuses writes.
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    records: DashMap<(String, String), StoredRecord>,
    offline: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Peek at a record without going through the client API.
    pub fn snapshot(&self, bucket: &str, key: &str) -> Option<StoredRecord> {
        self.records
            .get(&(bucket.to_string(), key.to_string()))
            .map(|r| r.value().clone())
    }

    /// Seed a record as-is, bypassing offline/read-only checks.
    pub fn insert_raw(&self, bucket: &str, key: &str, record: StoredRecord) {
        self.records
            .insert((bucket.to_string(), key.to_string()), record);
    }

    /// Number of records in `bucket`.
    pub fn len(&self, bucket: &str) -> usize {
        self.records.iter().filter(|e| e.key().0 == bucket).count()
    }

    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                endpoint: "memory".to_string(),
                message: "store offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.check_online()?;
        Ok(self.snapshot(bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, record: &StoredRecord) -> Result<bool, StoreError> {
        self.check_online()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.records
            .insert((bucket.to_string(), key.to_string()), record.clone());
        Ok(true)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.records.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn scan(&self, bucket: &str, predicate: &ScanPredicate) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .records
            .iter()
            .filter(|e| e.key().0 == bucket && predicate.matches(e.value()))
            .map(|e| e.key().1.clone())
            .collect())
    }
}
