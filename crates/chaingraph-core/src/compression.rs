// ABOUTME: Encoding of persisted session blobs
// ABOUTME: JSON compressed with zstd, then Base64 so the blob is a plain string

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

use crate::{ChainGraphError, Result};

/// Zstd compression level
const COMPRESSION_LEVEL: i32 = 3;

/// Prefix to identify compressed Base64 payloads
const COMPRESSION_PREFIX: &str = "zstd:";

pub fn encode_blob(value: &Value) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)?;
    Ok(format!("{}{}", COMPRESSION_PREFIX, BASE64.encode(compressed)))
}

/// Accepts prefixed blobs as well as uncompressed JSON text.
pub fn decode_blob(blob: &str) -> Result<Value> {
    let blob = blob.trim();
    match blob.strip_prefix(COMPRESSION_PREFIX) {
        Some(encoded) => {
            let compressed = BASE64
                .decode(encoded)
                .map_err(|e| ChainGraphError::Snapshot(format!("invalid base64: {}", e)))?;
            let json = zstd::decode_all(&compressed[..])?;
            Ok(serde_json::from_slice(&json)?)
        }
        None => Ok(serde_json::from_str(blob)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blob_is_prefixed_and_decodes() {
        let value = json!(["0.4.1", [[], [], []], null, {"currency": "satoshi"}, null]);
        let blob = encode_blob(&value).unwrap();
        assert!(blob.starts_with(COMPRESSION_PREFIX));
        assert_eq!(decode_blob(&blob).unwrap(), value);
    }

    #[test]
    fn plain_json_is_accepted() {
        assert_eq!(decode_blob(" [1, 2] ").unwrap(), json!([1, 2]));
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        assert!(matches!(
            decode_blob("zstd:not base64!"),
            Err(ChainGraphError::Snapshot(_))
        ));
        assert!(decode_blob("zstd:AAAA").is_err());
    }
}
