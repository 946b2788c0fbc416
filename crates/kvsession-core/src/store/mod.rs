//! Key-value store collaborators.
//!
//! [`KvClient`] is the seam to the store cluster: point reads, writes, deletes,
//! and a scan whose predicate is evaluated by the store itself. A
//! [`StoreConnection`] pairs a client with the host/port it was built for and is
//! shared (cheaply cloned) by every session adapter in the process.

pub mod memory;

#[cfg(feature = "file-backend")]
pub mod file;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::error::{ConfigError, StoreError};

pub use memory::MemoryKvClient;

/// Persisted record shape: `data` (codec-encoded payload) and `atime` (epoch seconds).
///
/// Both fields are optional on the wire so that partially written or foreign
/// records still load; such records are always eligible for expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atime: Option<i64>,
}

impl StoredRecord {
    pub fn new(data: impl Into<String>, atime: i64) -> Self {
        Self {
            data: Some(data.into()),
            atime: Some(atime),
        }
    }
}

/// Predicate shipped to the store and evaluated next to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPredicate {
    /// `atime` missing, `data` missing, or `atime < cutoff`.
    Expired { cutoff: i64 },
}

impl ScanPredicate {
    /// Reference evaluation, used by backends without a query engine.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        match *self {
            ScanPredicate::Expired { cutoff } => match (&record.data, record.atime) {
                (Some(_), Some(atime)) => atime < cutoff,
                _ => true,
            },
        }
    }
}

/// Client for a key-value store cluster.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Fetch a record. A missing key is `Ok(None)`, never an error.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Store a record under `key`, replacing any previous one.
    ///
    /// Returns `Ok(false)` when the store was reached but refused the write.
    async fn put(&self, bucket: &str, key: &str, record: &StoredRecord) -> Result<bool, StoreError>;

    /// Remove `key`. Succeeds whether or not the key existed.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Keys of every record in `bucket` matching `predicate`, in no particular order.
    async fn scan(&self, bucket: &str, predicate: &ScanPredicate) -> Result<Vec<String>, StoreError>;
}

/// Handle to the key-value cluster.
#[derive(Clone)]
pub struct StoreConnection {
    host: String,
    port: u16,
    client: Arc<dyn KvClient>,
}

impl StoreConnection {
    pub fn new(host: impl Into<String>, port: u16, client: Arc<dyn KvClient>) -> Self {
        Self {
            host: host.into(),
            port,
            client,
        }
    }

    /// Build the client selected by `config.backend`.
    pub async fn connect(config: &Config) -> Result<Self, ConfigError> {
        let client: Arc<dyn KvClient> = match config.backend {
            StoreBackend::Memory => Arc::new(MemoryKvClient::new()),
            StoreBackend::File => file_client(config)?,
            StoreBackend::Dynamodb => dynamo_client(config).await?,
        };

        info!(
            backend = client.name(),
            endpoint = %config.endpoint(),
            "Connected to session store"
        );

        Ok(Self::new(config.host.clone(), config.port, client))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client(&self) -> &dyn KvClient {
        self.client.as_ref()
    }
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.client.name())
            .finish()
    }
}

#[cfg(feature = "file-backend")]
fn file_client(config: &Config) -> Result<Arc<dyn KvClient>, ConfigError> {
    let client = file::FileKvClient::new(config.data_dir_path())
        .map_err(|e| ConfigError::Invalid(format!("data dir: {e}")))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "file-backend"))]
fn file_client(_config: &Config) -> Result<Arc<dyn KvClient>, ConfigError> {
    Err(ConfigError::BackendUnavailable("file".to_string()))
}

#[cfg(feature = "dynamodb-backend")]
async fn dynamo_client(config: &Config) -> Result<Arc<dyn KvClient>, ConfigError> {
    Ok(Arc::new(dynamo::DynamoKvClient::from_config(config).await))
}

#[cfg(not(feature = "dynamodb-backend"))]
async fn dynamo_client(_config: &Config) -> Result<Arc<dyn KvClient>, ConfigError> {
    Err(ConfigError::BackendUnavailable("dynamodb".to_string()))
}
