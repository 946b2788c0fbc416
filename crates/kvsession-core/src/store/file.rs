use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{KvClient, ScanPredicate, StoredRecord};
use crate::error::StoreError;

/// Longest encoded key used verbatim as a file stem.
const MAX_PLAIN_STEM: usize = 128;

/// File-based store: one directory per bucket, one JSON file per key.
///
/// File names are the URL-safe base64 of the key, so any session id maps to a
/// distinct, reversible name. Keys whose encoding exceeds [`MAX_PLAIN_STEM`]
/// are stored under `~` plus the base64 of their SHA-256; the key itself is
/// kept inside the file.
pub struct FileKvClient {
    root: PathBuf,
}

/// On-disk shape: the record plus the key it belongs to.
#[derive(Serialize, Deserialize)]
struct FileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(flatten)]
    record: StoredRecord,
}

impl FileKvClient {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(bucket.as_bytes()))
    }

    fn record_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket).join(format!("{}.json", file_stem(key)))
    }
}

fn file_stem(key: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
    if encoded.len() <= MAX_PLAIN_STEM {
        return encoded;
    }
    format!("~{}", URL_SAFE_NO_PAD.encode(Sha256::digest(key.as_bytes())))
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Key recovered from a plain file stem. Hashed stems yield `None`.
fn key_from_path(path: &Path) -> Option<String> {
    if !is_record_file(path) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let bytes = URL_SAFE_NO_PAD.decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl KvClient for FileKvClient {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let path = self.record_path(bucket, key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry =
            serde_json::from_str(&content).map_err(|e| StoreError::MalformedRecord {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        match entry.id {
            Some(id) if id != key => Ok(None),
            _ => Ok(Some(entry.record)),
        }
    }

    async fn put(&self, bucket: &str, key: &str, record: &StoredRecord) -> Result<bool, StoreError> {
        let entry = FileEntry {
            id: Some(key.to_string()),
            record: record.clone(),
        };
        let json = serde_json::to_vec(&entry).map_err(|e| StoreError::MalformedRecord {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        // Each write gets its own temp file, renamed over the record when complete.
        // A failed write drops (and removes) its temp file.
        let dir = self.bucket_dir(bucket);
        let path = self.record_path(bucket, key);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("file write task failed: {}", e)))??;
        Ok(true)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.record_path(bucket, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan(&self, bucket: &str, predicate: &ScanPredicate) -> Result<Vec<String>, StoreError> {
        let dir = self.bucket_dir(bucket);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record_file(&path) {
                debug!(path = %path.display(), "Skipping non-record file");
                continue;
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let (key, record) = match serde_json::from_str::<FileEntry>(&content) {
                Ok(FileEntry { id, record }) => (id.or_else(|| key_from_path(&path)), record),
                Err(e) => {
                    warn!(path = %path.display(), "Unreadable record counts as expired: {}", e);
                    (key_from_path(&path), StoredRecord::default())
                }
            };
            let Some(key) = key else {
                warn!(path = %path.display(), "Skipping record with no recoverable key");
                continue;
            };

            if predicate.matches(&record) {
                keys.push(key);
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();

        assert_eq!(client.get("sessions", "abc").await.unwrap(), None);
        client
            .put("sessions", "abc", &StoredRecord::new("payload", 10))
            .await
            .unwrap();

        let record = client.get("sessions", "abc").await.unwrap().unwrap();
        assert_eq!(record, StoredRecord::new("payload", 10));

        let path = client.record_path("sessions", "abc");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"atime\":10"));
    }

    #[tokio::test]
    async fn test_file_store_keys_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();

        client.put("s", "a:b", &StoredRecord::new("1", 1)).await.unwrap();
        client.put("s", "a_b", &StoredRecord::new("2", 1)).await.unwrap();
        client.put("s", "../x", &StoredRecord::new("3", 1)).await.unwrap();

        assert_eq!(client.get("s", "a:b").await.unwrap().unwrap().data.as_deref(), Some("1"));
        assert_eq!(client.get("s", "a_b").await.unwrap().unwrap().data.as_deref(), Some("2"));
        assert_eq!(client.get("s", "../x").await.unwrap().unwrap().data.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_file_store_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();

        client.put("s", "k", &StoredRecord::new("v", 1)).await.unwrap();
        client.delete("s", "k").await.unwrap();
        client.delete("s", "k").await.unwrap();
        assert!(!client.record_path("s", "k").exists());
    }

    #[tokio::test]
    async fn test_file_store_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();

        client.put("s", "old", &StoredRecord::new("x", 100)).await.unwrap();
        client.put("s", "fresh", &StoredRecord::new("x", 500)).await.unwrap();

        // Foreign file in the bucket dir, and a corrupt record.
        std::fs::write(client.bucket_dir("s").join("README"), "hi").unwrap();
        std::fs::write(client.record_path("s", "corrupt"), "{not json").unwrap();

        let mut keys = client
            .scan("s", &ScanPredicate::Expired { cutoff: 200 })
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec!["corrupt".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_scan_missing_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();
        let keys = client
            .scan("nothing-here", &ScanPredicate::Expired { cutoff: 0 })
            .await
            .unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_malformed_get() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();
        client.put("s", "k", &StoredRecord::new("v", 1)).await.unwrap();
        std::fs::write(client.record_path("s", "k"), "garbage").unwrap();

        let err = client.get("s", "k").await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedRecord { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_puts_same_key() {
        let tmp = tempfile::tempdir().unwrap();
        let client = std::sync::Arc::new(FileKvClient::new(tmp.path()).unwrap());

        for round in 0..50 {
            let mut handles = Vec::new();
            for writer in 0..8 {
                let client = client.clone();
                handles.push(tokio::spawn(async move {
                    let record = StoredRecord::new(format!("{round}-{writer}"), round);
                    client.put("s", "dup", &record).await
                }));
            }
            for handle in handles {
                assert!(handle.await.unwrap().unwrap());
            }
        }

        let record = client.get("s", "dup").await.unwrap().unwrap();
        assert_eq!(record.atime, Some(49));
        assert!(record.data.unwrap().starts_with("49-"));

        let names: Vec<_> = std::fs::read_dir(client.bucket_dir("s"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_failed_put_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();

        // A directory where the record should go makes the final rename fail.
        std::fs::create_dir_all(client.record_path("s", "k")).unwrap();
        assert!(client.put("s", "k", &StoredRecord::new("v", 1)).await.is_err());

        let names: Vec<_> = std::fs::read_dir(client.bucket_dir("s"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(names, vec![client.record_path("s", "k")]);
    }

    #[tokio::test]
    async fn test_file_store_long_key() {
        let tmp = tempfile::tempdir().unwrap();
        let client = FileKvClient::new(tmp.path()).unwrap();
        let long_id = "x".repeat(500);
        let other_long_id = format!("{}y", "x".repeat(499));

        client.put("s", &long_id, &StoredRecord::new("a", 100)).await.unwrap();
        client.put("s", &other_long_id, &StoredRecord::new("b", 900)).await.unwrap();

        let path = client.record_path("s", &long_id);
        assert!(path.file_name().unwrap().len() < 255);
        assert_eq!(
            client.get("s", &long_id).await.unwrap().unwrap().data.as_deref(),
            Some("a")
        );
        assert_eq!(
            client.get("s", &other_long_id).await.unwrap().unwrap().data.as_deref(),
            Some("b")
        );

        let keys = client
            .scan("s", &ScanPredicate::Expired { cutoff: 200 })
            .await
            .unwrap();
        assert_eq!(keys, vec![long_id.clone()]);

        client.delete("s", &long_id).await.unwrap();
        assert_eq!(client.get("s", &long_id).await.unwrap(), None);
    }
}
