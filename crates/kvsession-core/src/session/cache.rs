use tracing::{debug, trace, warn};

use super::{SessionBucket, SessionRecord};
use crate::error::StoreError;

/// Per-request memo of the active session's record.
///
/// Holds at most one record. A request is expected to touch a single session
/// id; resolving a different id re-fetches and replaces the cached entry.
/// The cache never writes back on its own: callers persist mutations.
#[derive(Debug, Default)]
pub struct SessionRecordCache {
    current: Option<SessionRecord>,
}

impl SessionRecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SessionRecord> {
        self.current.as_ref()
    }

    /// Cached record for `id`, else fetch it, else create and store an empty one.
    pub async fn resolve(
        &mut self,
        bucket: &SessionBucket,
        id: &str,
        now: i64,
    ) -> Result<&mut SessionRecord, StoreError> {
        let record = match self.current.take() {
            Some(cached) if cached.id == id => {
                trace!(session_id = %id, "Session record cache hit");
                cached
            }
            previous => {
                if let Some(prev) = previous {
                    debug!(
                        previous = %prev.id,
                        session_id = %id,
                        "Different session id in the same request, re-fetching"
                    );
                }
                fetch_or_create(bucket, id, now).await?
            }
        };

        Ok(self.current.insert(record))
    }

    /// Drop the cached record if it belongs to `id`.
    pub fn forget(&mut self, id: &str) {
        if self.current.as_ref().is_some_and(|r| r.id == id) {
            self.current = None;
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

async fn fetch_or_create(
    bucket: &SessionBucket,
    id: &str,
    now: i64,
) -> Result<SessionRecord, StoreError> {
    if let Some(record) = bucket.fetch(id).await? {
        return Ok(record);
    }

    let record = SessionRecord::new(id, now);
    if bucket.store(&record).await? {
        debug!(bucket = %bucket.name(), session_id = %id, "Created empty session record");
    } else {
        warn!(bucket = %bucket.name(), session_id = %id, "Store refused new session record");
    }
    Ok(record)
}
