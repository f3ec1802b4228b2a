//! Framing of configuration artifact payloads.
//!
//! Configuration artifacts carry one opaque `raw_data` field holding the
//! JSON text of the payload, base64-encoded with the standard alphabet.
//! Workload pods decode the same framing, so both directions live here.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Failures decoding a `raw_data` payload.
#[derive(Error, Debug)]
pub enum RawDataError {
    #[error("raw_data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("raw_data does not contain UTF-8 JSON: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("raw_data JSON does not match the expected payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a payload into the `raw_data` framing.
pub fn encode_raw_data<T: Serialize>(payload: &T) -> Result<String, RawDataError> {
    let json = serde_json::to_string(payload)?;
    Ok(STANDARD.encode(json))
}

/// Decode a `raw_data` field back into a payload.
pub fn decode_raw_data<T: DeserializeOwned>(raw_data: &str) -> Result<T, RawDataError> {
    let bytes = STANDARD.decode(raw_data)?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}

/// Tri-state boolean parse for env vars like `PREWARM`.
///
/// `"true"`/`"false"` map to `Some`; anything else (including an absent
/// variable on legacy workloads) is `None`.
pub fn parse_tristate_bool(value: Option<&str>) -> Option<bool> {
    match value {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}
