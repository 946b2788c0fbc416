/// Core error types for kvsession.
#[derive(Debug, thiserror::Error)]
pub enum KvSessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backend '{0}' is not compiled into this build")]
    BackendUnavailable(String),
}

/// Failures talking to the key-value store.
///
/// "Not found" is never an error at this level: clients report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot reach store at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Malformed record '{key}': {message}")]
    MalformedRecord { key: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode payload: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session id: {0}")]
    InvalidId(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),
}

pub type Result<T> = std::result::Result<T, KvSessionError>;
