use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::Config;
use crate::error::CodecError;

/// Encode/decode strategy applied to session payloads before storage.
pub trait SessionCodec: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, payload: &str) -> String;

    fn decode(&self, stored: &str) -> Result<String, CodecError>;
}

/// Stores payloads as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl SessionCodec for RawCodec {
    fn name(&self) -> &str {
        "raw"
    }

    fn encode(&self, payload: &str) -> String {
        payload.to_string()
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        Ok(stored.to_string())
    }
}

/// Structured codec: standard base64 over the payload's UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl SessionCodec for Base64Codec {
    fn name(&self) -> &str {
        "base64"
    }

    fn encode(&self, payload: &str) -> String {
        STANDARD.encode(payload.as_bytes())
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        let bytes = STANDARD
            .decode(stored.trim())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Pick the codec named by the config.
pub fn codec_for(config: &Config) -> Box<dyn SessionCodec> {
    if config.use_structured_codec {
        Box::new(Base64Codec)
    } else {
        Box::new(RawCodec)
    }
}
