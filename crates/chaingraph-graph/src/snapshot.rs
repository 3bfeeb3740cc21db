use chaingraph_core::{unprefix, EntityPayload, EntityRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::edge::EdgeEntry;
use crate::error::Result;
use crate::store::GraphStore;

/// Snapshot versions whose link sources were stored without a keyspace prefix.
pub const UNPREFIXED_LINK_VERSIONS: &[&str] = &["0.4.0"];

/// `[addresses, clusters, links]`. Addresses carry their cluster as an id, clusters
/// their members as an id list, links are `[prefixedSourceId, [{key, value}]]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot(
    pub Vec<Value>,
    pub Vec<Value>,
    pub Vec<(String, Vec<EdgeEntry>)>,
);

impl StoreSnapshot {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn addresses(&self) -> &[Value] {
        &self.0
    }

    pub fn clusters(&self) -> &[Value] {
        &self.1
    }

    pub fn links(&self) -> &[(String, Vec<EdgeEntry>)] {
        &self.2
    }
}

impl GraphStore {
    pub fn serialize(&self) -> StoreSnapshot {
        let addresses = self
            .addresses()
            .map(|a| EntityRef::Address(a).to_value())
            .collect();
        let clusters = self
            .clusters()
            .map(|c| EntityRef::Cluster(c).to_value())
            .collect();
        let links = self
            .edge_tables()
            .map(|(source, table)| (source.clone(), EdgeEntry::from_table(table)))
            .collect();
        StoreSnapshot(addresses, clusters, links)
    }

    /// Rebuilds the store from a snapshot on top of its current content.
    ///
    /// Clusters go first with their member lists turned into `forAddresses`, then
    /// addresses, whose cluster references recreate the membership, then every edge
    /// through `link_outgoing`. Entities that fail to parse are skipped.
    pub fn deserialize(&mut self, version: &str, snapshot: StoreSnapshot) {
        let StoreSnapshot(addresses, clusters, links) = snapshot;

        for mut cluster in clusters {
            if let Value::Object(object) = &mut cluster {
                if let Some(members) = object.remove("addresses") {
                    object.insert("forAddresses".to_string(), members);
                }
            }
            self.add_snapshot_entity(cluster);
        }
        for address in addresses {
            self.add_snapshot_entity(address);
        }

        let unprefixed = UNPREFIXED_LINK_VERSIONS.contains(&version);
        let mut restored = 0usize;
        for (source, entries) in links {
            let (keyspace, source_id) = if unprefixed {
                match self.find(&source, None) {
                    Some(found) => (found.keyspace().to_string(), source.clone()),
                    None => {
                        debug!(source, "dropping links of unknown source");
                        continue;
                    }
                }
            } else {
                match unprefix(&source) {
                    (Some(keyspace), id) => (keyspace.to_string(), id.to_string()),
                    (None, _) => {
                        warn!(source, version, "link source without keyspace");
                        continue;
                    }
                }
            };
            for entry in entries {
                self.link_outgoing(&source_id, &entry.key, &keyspace, entry.value.as_ref());
                restored += 1;
            }
        }
        debug!(
            version,
            entities = self.len(),
            edges = restored,
            "store deserialized"
        );
    }

    fn add_snapshot_entity(&mut self, value: Value) {
        match EntityPayload::from_value(value) {
            Ok(payload) => {
                self.add(payload);
            }
            Err(e) => warn!("skipping snapshot entity: {}", e),
        }
    }
}
