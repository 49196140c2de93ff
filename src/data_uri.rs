//! `data:` URI encoding for captured images

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::{Error, Result};

pub const PNG_MIME: &str = "image/png";

/// Encode bytes as a base64 `data:` URI.
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Decode a base64 `data:` URI into its mime type and payload bytes.
pub fn decode(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| Error::EncodeError("not a data URI".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::EncodeError("data URI has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::EncodeError("only base64 data URIs are supported".into()))?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| Error::EncodeError(format!("invalid base64 payload: {e}")))?;
    Ok((mime.to_string(), bytes))
}
