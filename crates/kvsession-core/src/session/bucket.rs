use tracing::trace;

use super::SessionRecord;
use crate::error::{SessionError, StoreError};
use crate::store::{ScanPredicate, StoreConnection};

/// A namespace in the store holding one record per session id.
#[derive(Debug, Clone)]
pub struct SessionBucket {
    conn: StoreConnection,
    name: String,
}

impl SessionBucket {
    /// Bind a bucket name to a connection. Performs no I/O.
    pub fn open(conn: StoreConnection, name: impl Into<String>) -> Result<Self, SessionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SessionError::InvalidBucket(name));
        }
        Ok(Self { conn, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &StoreConnection {
        &self.conn
    }

    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub async fn fetch(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let stored = self.conn.client().get(&self.name, id).await?;
        trace!(bucket = %self.name, session_id = %id, found = stored.is_some(), "fetch");
        Ok(stored.map(|s| SessionRecord::from_stored(id, s)))
    }

    /// Persist the full record. `Ok(false)` means the store refused it.
    pub async fn store(&self, record: &SessionRecord) -> Result<bool, StoreError> {
        self.conn
            .client()
            .put(&self.name, &record.id, &record.to_stored())
            .await
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.conn.client().delete(&self.name, id).await
    }

    pub async fn scan(&self, predicate: &ScanPredicate) -> Result<Vec<String>, StoreError> {
        self.conn.client().scan(&self.name, predicate).await
    }
}
