pub mod adapter;
pub mod bucket;
pub mod cache;
pub mod expiry;

use crate::store::StoredRecord;

pub use adapter::{SessionHandler, SessionStore, SessionStoreAdapter};
pub use bucket::SessionBucket;
pub use cache::SessionRecordCache;
pub use expiry::ExpiryScanner;

/// One session's persisted state.
///
/// `payload` is kept in its stored (codec-encoded) form; the adapter decodes
/// it on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub payload: String,
    /// Epoch seconds of the last read or write.
    pub last_access_time: i64,
}

impl SessionRecord {
    /// A record that exists but carries no data yet.
    pub fn new(id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            payload: String::new(),
            last_access_time: now,
        }
    }

    /// Missing fields load as an empty payload and a zero timestamp.
    pub fn from_stored(id: impl Into<String>, stored: StoredRecord) -> Self {
        Self {
            id: id.into(),
            payload: stored.data.unwrap_or_default(),
            last_access_time: stored.atime.unwrap_or(0),
        }
    }

    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord::new(self.payload.clone(), self.last_access_time)
    }

    /// Bump the access time. Never moves it backwards.
    pub fn touch(&mut self, now: i64) {
        self.last_access_time = self.last_access_time.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_record_new() {
        let record = SessionRecord::new("abc", 100);
        assert_eq!(record.id, "abc");
        assert!(record.payload.is_empty());
        assert_eq!(record.last_access_time, 100);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut record = SessionRecord::new("abc", 100);
        record.touch(150);
        assert_eq!(record.last_access_time, 150);
        record.touch(120);
        assert_eq!(record.last_access_time, 150);
    }

    #[test]
    fn test_stored_conversion() {
        let record = SessionRecord::from_stored("k", StoredRecord::new("data", 7));
        assert_eq!(record.payload, "data");
        assert_eq!(record.to_stored(), StoredRecord::new("data", 7));

        let partial = SessionRecord::from_stored("k", StoredRecord::default());
        assert_eq!(partial, SessionRecord::new("k", 0));
    }
}
