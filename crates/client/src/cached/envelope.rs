//! JSON wrapper stored around cached bodies.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchRequest;
use fetchcache_core::Error;

/// The request that produced a cached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    pub method: String,
    pub url: String,
    pub payload: String,
}

/// Cached body plus the request it came from.
///
/// Serialized as
/// `{"request":{"method":..,"url":..,"payload":..},"data":..,"created_at":RFC3339}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub request: EnvelopeRequest,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEnvelope {
    pub fn new(request: &FetchRequest, data: String) -> Self {
        Self {
            request: EnvelopeRequest {
                method: request.method.to_string(),
                url: request.url.clone(),
                payload: request.payload.clone(),
            },
            data,
            created_at: Utc::now(),
        }
    }
}

/// Bytes to store for a fresh body.
///
/// Bodies that are not UTF-8 cannot live in `data` and are stored as-is;
/// [`decode_stored`] hands them back unchanged.
pub fn encode_body(request: &FetchRequest, body: &Bytes) -> Result<Vec<u8>, Error> {
    match std::str::from_utf8(body) {
        Ok(text) => serde_json::to_vec(&CacheEnvelope::new(request, text.to_owned()))
            .map_err(|e| Error::Decode(format!("failed to encode cache envelope: {e}"))),
        Err(_) => Ok(body.to_vec()),
    }
}

/// Body held in a stored value: the envelope's `data`, or the raw bytes for
/// entries written without an envelope.
pub fn decode_stored(stored: Vec<u8>) -> Bytes {
    match serde_json::from_slice::<CacheEnvelope>(&stored) {
        Ok(envelope) => Bytes::from(envelope.data),
        Err(_) => Bytes::from(stored),
    }
}
