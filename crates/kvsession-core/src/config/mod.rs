use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default max lifetime (seconds) for GC sweeps started without an explicit value.
pub const DEFAULT_MAX_LIFETIME: u64 = 1440;

/// Root configuration for kvsession.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Store host. Used as the endpoint host for network backends.
    pub host: String,
    pub port: u16,
    /// Namespace holding one record per session id.
    pub bucket: String,
    /// Encode payloads with the structured (base64) codec instead of storing them raw.
    pub use_structured_codec: bool,
    pub backend: StoreBackend,
    /// Root directory for the file backend.
    pub data_dir: String,
    /// Max lifetime used by `gc` sweeps when the caller does not pass one.
    pub max_lifetime: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8091,
            bucket: "sessions".to_string(),
            use_structured_codec: true,
            backend: StoreBackend::default(),
            data_dir: "~/.kvsession/data".to_string(),
            max_lifetime: DEFAULT_MAX_LIFETIME,
        }
    }
}

impl Config {
    /// Endpoint URL for network backends.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get expanded data directory path.
    pub fn data_dir_path(&self) -> PathBuf {
        let path = &self.data_dir;
        if path.starts_with("~/") || path.starts_with("~\\") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&path[2..]);
            }
        }
        PathBuf::from(path)
    }
}

/// Which key-value store implementation backs the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
    Dynamodb,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::File => "file",
            StoreBackend::Dynamodb => "dynamodb",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "dynamodb" | "dynamo" => Ok(StoreBackend::Dynamodb),
            other => Err(ConfigError::Invalid(format!("unknown backend: {other}"))),
        }
    }
}

/// Load config from environment variables.
///
/// `KVSESSION_CONFIG` may carry the whole config as JSON; individual variables
/// override single fields on top of it.
pub fn load_config_from_env() -> Config {
    let mut cfg = match std::env::var("KVSESSION_CONFIG") {
        Ok(json) => match serde_json::from_str::<Config>(&json) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Failed to parse KVSESSION_CONFIG: {}", e);
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };

    if let Ok(v) = std::env::var("KVSESSION_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("KVSESSION_PORT") {
        match v.parse() {
            Ok(port) => cfg.port = port,
            Err(_) => tracing::warn!("Ignoring invalid KVSESSION_PORT: {}", v),
        }
    }
    if let Ok(v) = std::env::var("KVSESSION_BUCKET") {
        cfg.bucket = v;
    }
    if let Ok(v) = std::env::var("KVSESSION_STRUCTURED_CODEC") {
        cfg.use_structured_codec = !matches!(v.trim(), "0" | "false" | "no" | "off");
    }
    if let Ok(v) = std::env::var("KVSESSION_BACKEND") {
        match v.parse() {
            Ok(backend) => cfg.backend = backend,
            Err(e) => tracing::warn!("Ignoring KVSESSION_BACKEND: {}", e),
        }
    }
    if let Ok(v) = std::env::var("KVSESSION_DATA_DIR") {
        cfg.data_dir = v;
    }
    if let Ok(v) = std::env::var("KVSESSION_MAX_LIFETIME") {
        match v.parse() {
            Ok(secs) => cfg.max_lifetime = secs,
            Err(_) => tracing::warn!("Ignoring invalid KVSESSION_MAX_LIFETIME: {}", v),
        }
    }

    cfg
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the kvsession data directory.
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kvsession")
}

/// Load configuration from file or create default.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8091);
        assert_eq!(cfg.bucket, "sessions");
        assert!(cfg.use_structured_codec);
        assert_eq!(cfg.backend, StoreBackend::File);
        assert_eq!(cfg.endpoint(), "http://127.0.0.1:8091");
    }

    #[test]
    fn test_config_camelcase_compat() {
        let json = r#"{
            "host": "10.0.0.5",
            "bucket": "web-sessions",
            "useStructuredCodec": false,
            "backend": "dynamodb"
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 8091);
        assert_eq!(cfg.bucket, "web-sessions");
        assert!(!cfg.use_structured_codec);
        assert_eq!(cfg.backend, StoreBackend::Dynamodb);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("dynamo".parse::<StoreBackend>().unwrap(), StoreBackend::Dynamodb);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_data_dir_expansion() {
        let cfg = Config::default();
        let dir = cfg.data_dir_path();
        assert!(!dir.to_str().unwrap().starts_with("~/"));
    }

    #[test]
    fn test_save_and_load_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut cfg = Config::default();
        cfg.bucket = "test-bucket".to_string();
        cfg.port = 9000;
        save_config(&cfg, Some(&path)).unwrap();

        assert!(path.exists());
        let loaded = load_config(Some(&path));
        assert_eq!(loaded.bucket, "test-bucket");
        assert_eq!(loaded.port, 9000);
    }

    #[test]
    fn test_load_config_missing_file() {
        let path = Path::new("/tmp/nonexistent_kvsession_test.json");
        let cfg = load_config(Some(path));
        assert_eq!(cfg.bucket, "sessions");
    }

    #[test]
    fn test_load_config_from_env() {
        std::env::set_var("KVSESSION_CONFIG", r#"{ "bucket": "from-json" }"#);
        std::env::set_var("KVSESSION_PORT", "8000");
        std::env::set_var("KVSESSION_STRUCTURED_CODEC", "false");

        let cfg = load_config_from_env();
        assert_eq!(cfg.bucket, "from-json");
        assert_eq!(cfg.port, 8000);
        assert!(!cfg.use_structured_codec);

        std::env::remove_var("KVSESSION_CONFIG");
        std::env::remove_var("KVSESSION_PORT");
        std::env::remove_var("KVSESSION_STRUCTURED_CODEC");
    }
}
