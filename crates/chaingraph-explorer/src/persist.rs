//! Saved sessions: `[version, store, graph, config, layout]` as JSON, compressed and
//! Base64-encoded into one string.

use chaingraph_core::{decode_blob, encode_blob, ViewConfig};
use chaingraph_graph::StoreSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ExplorerError, Result};

pub const CURRENT_VERSION: &str = "0.4.1";

/// Versions `load` accepts, oldest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.4.0", CURRENT_VERSION];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBlob(
    pub String,
    pub StoreSnapshot,
    pub Value,
    #[serde(default)] pub ViewConfig,
    #[serde(default)] pub Value,
);

impl SessionBlob {
    pub fn new(store: StoreSnapshot, graph: Value, config: ViewConfig, layout: Value) -> Self {
        Self(CURRENT_VERSION.to_string(), store, graph, config, layout)
    }

    pub fn version(&self) -> &str {
        &self.0
    }

    pub fn encode(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(encode_blob(&value)?)
    }

    pub fn decode(blob: &str) -> Result<Self> {
        let value = decode_blob(blob)?;
        let version = value
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| ExplorerError::Snapshot("missing version".to_string()))?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ExplorerError::UnsupportedVersion(version.to_string()));
        }
        debug!(version, "decoding session blob");
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_current_version() {
        let blob = SessionBlob::new(
            StoreSnapshot::default(),
            json!({"nodes": []}),
            ViewConfig::default(),
            Value::Null,
        );
        let decoded = SessionBlob::decode(&blob.encode().unwrap()).unwrap();
        assert_eq!(decoded.version(), CURRENT_VERSION);
        assert_eq!(decoded, blob);
    }

    #[test]
    fn older_blob_without_trailing_parts_is_read() {
        let decoded = SessionBlob::decode(r#"["0.4.0", [[], [], []], null]"#).unwrap();
        assert_eq!(decoded.version(), "0.4.0");
        assert_eq!(decoded.3, ViewConfig::default());
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(matches!(
            SessionBlob::decode(r#"["0.3.9", [[], [], []], null, {}, null]"#),
            Err(ExplorerError::UnsupportedVersion(v)) if v == "0.3.9"
        ));
        assert!(matches!(
            SessionBlob::decode("{}"),
            Err(ExplorerError::Snapshot(_))
        ));
    }
}
