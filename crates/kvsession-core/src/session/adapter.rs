use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ExpiryScanner, SessionBucket, SessionRecord, SessionRecordCache};
use crate::codec::{codec_for, SessionCodec};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::store::StoreConnection;
use crate::util::{Clock, SystemClock};

/// Session lifecycle callbacks, one call per event per request.
///
/// Hosts create one handler per request (see [`SessionStore::adapter`]) and
/// drive it in order: `open`, then any of `read`/`write`/`destroy`, then `close`.
/// `gc` may be called on any handler, independently of the request's session.
#[async_trait]
pub trait SessionHandler: Send {
    /// True iff the handler is bound to a usable bucket. No I/O.
    fn open(&mut self, save_path: &str, session_name: &str) -> bool;

    /// Always true.
    fn close(&mut self) -> bool;

    /// Decoded payload for `id`; empty for a session seen for the first time.
    async fn read(&mut self, id: &str) -> Result<String>;

    /// Replace the payload for `id`. False if the store refused the write.
    async fn write(&mut self, id: &str, data: &str) -> Result<bool>;

    /// Remove `id`. True whether or not it existed.
    async fn destroy(&mut self, id: &str) -> Result<bool>;

    /// Remove every session idle for more than `max_lifetime` seconds.
    async fn gc(&mut self, max_lifetime: u64) -> Result<bool>;
}

/// Process-wide wiring: shared connection, bucket, codec and clock.
/// Hands out one [`SessionStoreAdapter`] per request.
#[derive(Clone)]
pub struct SessionStore {
    bucket: SessionBucket,
    codec: Arc<dyn SessionCodec>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(bucket: SessionBucket, codec: Arc<dyn SessionCodec>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bucket,
            codec,
            clock,
        }
    }

    /// Connect to the configured backend and bind the configured bucket.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let conn = StoreConnection::connect(config).await?;
        Self::with_connection(conn, config)
    }

    /// Bind the configured bucket on an existing connection.
    pub fn with_connection(conn: StoreConnection, config: &Config) -> Result<Self> {
        let bucket = SessionBucket::open(conn, config.bucket.clone())?;
        Ok(Self::new(
            bucket,
            Arc::from(codec_for(config)),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn bucket(&self) -> &SessionBucket {
        &self.bucket
    }

    pub fn codec(&self) -> &dyn SessionCodec {
        self.codec.as_ref()
    }

    /// A fresh handler with an empty record cache.
    pub fn adapter(&self) -> SessionStoreAdapter {
        SessionStoreAdapter::new(self.bucket.clone(), self.codec.clone(), self.clock.clone())
    }
}

/// [`SessionHandler`] backed by a key-value bucket.
///
/// Owns the request's [`SessionRecordCache`]; dropping the adapter drops it.
pub struct SessionStoreAdapter {
    bucket: SessionBucket,
    scanner: ExpiryScanner,
    codec: Arc<dyn SessionCodec>,
    clock: Arc<dyn Clock>,
    cache: SessionRecordCache,
}

impl SessionStoreAdapter {
    pub fn new(bucket: SessionBucket, codec: Arc<dyn SessionCodec>, clock: Arc<dyn Clock>) -> Self {
        let scanner = ExpiryScanner::new(bucket.connection().clone());
        Self {
            bucket,
            scanner,
            codec,
            clock,
            cache: SessionRecordCache::new(),
        }
    }

    pub fn bucket(&self) -> &SessionBucket {
        &self.bucket
    }

    /// The record cached for this request, if any.
    pub fn cached(&self) -> Option<&SessionRecord> {
        self.cache.current()
    }

    /// Ids that a `gc(max_lifetime)` call would remove right now.
    pub async fn expired_ids(&self, max_lifetime: u64) -> Result<Vec<String>> {
        let cutoff = ExpiryScanner::cutoff(self.clock.now(), max_lifetime);
        Ok(self.scanner.scan(self.bucket.name(), cutoff).await?)
    }

    /// Scan and destroy expired sessions, returning how many were removed.
    ///
    /// Deletes run one by one; an error stops the sweep and leaves the rest
    /// for the next pass.
    pub async fn collect_garbage(&mut self, max_lifetime: u64) -> Result<usize> {
        let ids = self.expired_ids(max_lifetime).await?;
        for id in &ids {
            self.destroy(id).await?;
        }
        if !ids.is_empty() {
            info!(
                bucket = %self.bucket.name(),
                removed = ids.len(),
                max_lifetime,
                "Expired sessions removed"
            );
        }
        Ok(ids.len())
    }
}

fn validate_id(id: &str) -> std::result::Result<(), SessionError> {
    if id.is_empty() {
        return Err(SessionError::InvalidId("empty session id".to_string()));
    }
    Ok(())
}

#[async_trait]
impl SessionHandler for SessionStoreAdapter {
    fn open(&mut self, save_path: &str, session_name: &str) -> bool {
        debug!(
            bucket = %self.bucket.name(),
            save_path = %save_path,
            session_name = %session_name,
            "Session opened"
        );
        self.bucket.is_valid()
    }

    fn close(&mut self) -> bool {
        true
    }

    async fn read(&mut self, id: &str) -> Result<String> {
        validate_id(id)?;
        let now = self.clock.now();
        let record = self.cache.resolve(&self.bucket, id, now).await?;

        record.touch(now);
        if !self.bucket.store(record).await? {
            warn!(session_id = %id, "Store refused access time update");
        }

        match self.codec.decode(&record.payload) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(session_id = %id, codec = self.codec.name(), "{}", e);
                Ok(record.payload.clone())
            }
        }
    }

    async fn write(&mut self, id: &str, data: &str) -> Result<bool> {
        validate_id(id)?;
        let now = self.clock.now();
        let encoded = self.codec.encode(data);
        let record = self.cache.resolve(&self.bucket, id, now).await?;

        record.payload = encoded;
        record.touch(now);
        let acked = self.bucket.store(record).await?;
        if !acked {
            warn!(session_id = %id, "Store refused session write");
        }
        Ok(acked)
    }

    async fn destroy(&mut self, id: &str) -> Result<bool> {
        validate_id(id)?;
        self.bucket.remove(id).await?;
        self.cache.forget(id);
        debug!(bucket = %self.bucket.name(), session_id = %id, "Session destroyed");
        Ok(true)
    }

    async fn gc(&mut self, max_lifetime: u64) -> Result<bool> {
        self.collect_garbage(max_lifetime).await?;
        Ok(true)
    }
}
