//! Store-side discovery of expired sessions.
//!
//! The expiry test runs inside the store's own engine so a GC pass only moves
//! matching keys over the network, never payloads. Backends without a query
//! engine fall back to [`ScanPredicate::matches`].

use tracing::info;

use crate::error::StoreError;
use crate::store::{ScanPredicate, StoreConnection};

#[derive(Debug, Clone)]
pub struct ExpiryScanner {
    conn: StoreConnection,
}

impl ExpiryScanner {
    pub fn new(conn: StoreConnection) -> Self {
        Self { conn }
    }

    /// `now - max_lifetime`, clamped to the `i64` range.
    pub fn cutoff(now: i64, max_lifetime: u64) -> i64 {
        let cutoff = i128::from(now) - i128::from(max_lifetime);
        cutoff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Ids in `bucket` whose access time is missing or older than `cutoff`,
    /// or whose payload is missing. Any scan failure fails the whole call.
    pub async fn scan(&self, bucket: &str, cutoff: i64) -> Result<Vec<String>, StoreError> {
        let ids = self
            .conn
            .client()
            .scan(bucket, &ScanPredicate::Expired { cutoff })
            .await?;
        info!(bucket = %bucket, cutoff, expired = ids.len(), "Expiry scan complete");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryKvClient, StoredRecord};
    use std::sync::Arc;

    #[test]
    fn test_cutoff() {
        assert_eq!(ExpiryScanner::cutoff(1_000, 60), 940);
        assert_eq!(ExpiryScanner::cutoff(0, u64::MAX), i64::MIN);
        assert_eq!(ExpiryScanner::cutoff(i64::MIN + 5, 10), i64::MIN);
        assert_eq!(ExpiryScanner::cutoff(i64::MAX, 0), i64::MAX);
        assert_eq!(ExpiryScanner::cutoff(-100, i64::MAX as u64), i64::MIN);
    }

    #[tokio::test]
    async fn test_scan_finds_stale_and_partial_records() {
        let client = Arc::new(MemoryKvClient::new());
        client.insert_raw("sessions", "old", StoredRecord::new("x", 880));
        client.insert_raw("sessions", "new", StoredRecord::new("x", 970));
        client.insert_raw(
            "sessions",
            "no-atime",
            StoredRecord {
                data: Some("x".to_string()),
                atime: None,
            },
        );
        client.insert_raw(
            "sessions",
            "no-data",
            StoredRecord {
                data: None,
                atime: Some(999),
            },
        );
        client.insert_raw("other", "old", StoredRecord::new("x", 0));

        let scanner = ExpiryScanner::new(StoreConnection::new("h", 1, client));
        let mut ids = scanner
            .scan("sessions", ExpiryScanner::cutoff(1_000, 60))
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["no-atime", "no-data", "old"]);
    }

    #[tokio::test]
    async fn test_scan_failure_propagates() {
        let client = Arc::new(MemoryKvClient::new());
        client.insert_raw("sessions", "old", StoredRecord::new("x", 0));
        client.set_offline(true);

        let scanner = ExpiryScanner::new(StoreConnection::new("h", 1, client));
        assert!(scanner.scan("sessions", 100).await.is_err());
    }
}
