//! Payload codec surface
//!
//! The cache stores opaque bytes; converting application values to and from
//! those bytes is the caller's concern. A payload carries an explicit schema
//! tag chosen by the application, which replaces any runtime type-registry
//! lookup: the tag travels with the bytes and the application dispatches on
//! it when decoding.

use crate::error::{Error, Result};

/// An application payload: caller-chosen schema tag plus encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Application-supplied schema or type identifier.
    pub schema: String,
    /// Encoded value bytes.
    pub data: Vec<u8>,
}

impl Payload {
    /// Convenience constructor.
    #[must_use]
    pub fn new(schema: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            schema: schema.into(),
            data: data.into(),
        }
    }
}

/// Converts payloads to and from on-disk bytes.
///
/// Injected into the engine; implementations must be thread-safe.
pub trait PayloadCodec: Send + Sync {
    /// Encode a payload into on-disk bytes.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>>;
    /// Decode on-disk bytes back into a payload.
    fn decode(&self, bytes: &[u8]) -> Result<Payload>;
}

/// Default codec: length-prefixed schema tag followed by the raw payload.
///
/// ```text
/// [u32 LE schema length][schema bytes][payload bytes]
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FramedCodec;

impl PayloadCodec for FramedCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        let schema = payload.schema.as_bytes();
        let schema_len = u32::try_from(schema.len())
            .map_err(|_| Error::serialization("schema tag exceeds u32 length"))?;
        let mut bytes = Vec::with_capacity(4 + schema.len() + payload.data.len());
        bytes.extend_from_slice(&schema_len.to_le_bytes());
        bytes.extend_from_slice(schema);
        bytes.extend_from_slice(&payload.data);
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        let header: [u8; 4] = bytes
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| Error::serialization("payload truncated: missing frame header"))?;
        let schema_len = u32::from_le_bytes(header) as usize;
        let schema_end = 4 + schema_len;
        let schema = bytes
            .get(4..schema_end)
            .ok_or_else(|| Error::serialization("payload truncated: schema tag cut short"))?;
        let schema = std::str::from_utf8(schema)
            .map_err(|_| Error::serialization("schema tag is not valid UTF-8"))?;
        Ok(Payload {
            schema: schema.to_string(),
            data: bytes[schema_end..].to_vec(),
        })
    }
}
