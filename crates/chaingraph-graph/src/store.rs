use chaingraph_core::{
    prefix, Address, AddressPayload, Cluster, ClusterPayload, EdgeData, EdgeStats, EntityKey,
    EntityLookup, EntityPayload, EntityRef, EntityType, STRUCTURAL_FIELDS,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

use crate::edge::{upsert, EdgeTable, EdgeUpsert};
use crate::error::{Result, StoreError};

/// Deduplicated store of addresses, clusters and their outgoing edges.
///
/// Entities are keyed by `keyspace|id` within their type. The address/cluster
/// membership relation is only ever written here, so `a.cluster == c` holds exactly
/// when `c.addresses` contains `a`. Edge tables are keyed by the prefixed source id
/// and may exist before either endpoint is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    addresses: BTreeMap<String, Address>,
    clusters: BTreeMap<String, Cluster>,
    outgoing: BTreeMap<String, EdgeTable>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a payload into the store and returns the key of the merged entity.
    /// Payloads without a keyspace are rejected with a log line.
    pub fn add(&mut self, payload: EntityPayload) -> Option<EntityKey> {
        let Some(keyspace) = payload.keyspace().map(str::to_string) else {
            error!(
                entity_type = %payload.entity_type(),
                id = payload.id(),
                "invalid object, no keyspace"
            );
            return None;
        };
        match payload {
            EntityPayload::Address(address) => Some(self.add_address(keyspace, address)),
            EntityPayload::Cluster(cluster) => Some(self.add_cluster(keyspace, cluster)),
        }
    }

    /// Parses raw JSON at the boundary, then merges it. Malformed payloads are logged
    /// and ignored.
    pub fn add_value(&mut self, raw: Value) -> Option<EntityKey> {
        match EntityPayload::from_value(raw) {
            Ok(payload) => self.add(payload),
            Err(e) => {
                error!("invalid object: {}", e);
                None
            }
        }
    }

    fn add_address(&mut self, keyspace: String, payload: AddressPayload) -> EntityKey {
        let AddressPayload {
            id,
            cluster,
            attributes,
            ..
        } = payload;
        let key = prefix(&keyspace, &id);
        self.outgoing.entry(key.clone()).or_default();
        let address = self
            .addresses
            .entry(key)
            .or_insert_with(|| Address::new(keyspace.clone(), id.clone()));
        address.attributes.extend(attributes);

        if let Some(cluster_id) = cluster {
            self.link_member(&keyspace, &id, &cluster_id);
        }
        EntityKey::address(keyspace, id)
    }

    fn add_cluster(&mut self, keyspace: String, payload: ClusterPayload) -> EntityKey {
        let ClusterPayload {
            id,
            for_addresses,
            attributes,
            ..
        } = payload;
        self.ensure_cluster(&keyspace, &id)
            .attributes
            .extend(attributes);

        for address in for_addresses {
            if self.addresses.contains_key(&prefix(&keyspace, &address)) {
                self.link_member(&keyspace, &address, &id);
            } else {
                debug!(address, cluster = id, "forAddresses member not in store");
            }
        }
        EntityKey::cluster(keyspace, id)
    }

    fn ensure_cluster(&mut self, keyspace: &str, id: &str) -> &mut Cluster {
        let key = prefix(keyspace, id);
        self.outgoing.entry(key.clone()).or_default();
        self.clusters
            .entry(key)
            .or_insert_with(|| Cluster::new(keyspace, id))
    }

    /// Sets `address.cluster` and the matching member entry, detaching the address
    /// from any previous cluster.
    fn link_member(&mut self, keyspace: &str, address_id: &str, cluster_id: &str) {
        let address_key = prefix(keyspace, address_id);
        let previous = match self.addresses.get_mut(&address_key) {
            Some(address) => address.cluster.replace(cluster_id.to_string()),
            None => return,
        };
        if let Some(previous) = previous.filter(|p| p != cluster_id) {
            if let Some(old) = self.clusters.get_mut(&prefix(keyspace, &previous)) {
                old.addresses.remove(address_id);
            }
        }
        self.ensure_cluster(keyspace, cluster_id)
            .addresses
            .insert(address_id.to_string());
    }

    pub fn get(&self, key: &EntityKey) -> Option<EntityRef<'_>> {
        self.get_by(&key.keyspace, key.entity_type, &key.id)
    }

    pub fn get_by(&self, keyspace: &str, entity_type: EntityType, id: &str) -> Option<EntityRef<'_>> {
        let key = prefix(keyspace, id);
        match entity_type {
            EntityType::Address => self.addresses.get(&key).map(EntityRef::Address),
            EntityType::Cluster => self.clusters.get(&key).map(EntityRef::Cluster),
        }
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// First entity whose id matches, ignoring keyspace. Addresses are searched
    /// before clusters when no type is given. Linear; meant for loading old
    /// snapshots only.
    pub fn find(&self, id: &str, entity_type: Option<EntityType>) -> Option<EntityRef<'_>> {
        let address = || {
            self.addresses
                .values()
                .find(|a| a.id == id)
                .map(EntityRef::Address)
        };
        let cluster = || {
            self.clusters
                .values()
                .find(|c| c.id == id)
                .map(EntityRef::Cluster)
        };
        match entity_type {
            Some(EntityType::Address) => address(),
            Some(EntityType::Cluster) => cluster(),
            None => address().or_else(cluster),
        }
    }

    /// Records `source -> target`. Never fails: the edge may be learned before
    /// either endpoint is stored.
    pub fn link_outgoing(
        &mut self,
        source: &str,
        target: &str,
        keyspace: &str,
        data: Option<&EdgeData>,
    ) -> EdgeUpsert {
        let table = self.outgoing.entry(prefix(keyspace, source)).or_default();
        let outcome = upsert(table, target, data);
        if outcome.changed() {
            debug!(keyspace, source, target, ?outcome, "edge upserted");
        }
        outcome
    }

    pub fn outgoing(&self, keyspace: &str, id: &str) -> Option<&EdgeTable> {
        self.outgoing.get(&prefix(keyspace, id))
    }

    pub fn outgoing_count(&self, keyspace: &str, id: &str) -> usize {
        self.outgoing(keyspace, id).map(EdgeTable::len).unwrap_or(0)
    }

    /// `None` when no edge is known, `Some(None)` for an edge without stats.
    pub fn edge(&self, keyspace: &str, source: &str, target: &str) -> Option<Option<&EdgeStats>> {
        self.outgoing(keyspace, source)
            .and_then(|table| table.get(target))
            .map(Option::as_ref)
    }

    /// All edges as `(prefixed source, target, stats)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, Option<&EdgeStats>)> {
        self.outgoing.iter().flat_map(|(source, table)| {
            table
                .iter()
                .map(move |(target, stats)| (source.as_str(), target.as_str(), stats.as_ref()))
        })
    }

    pub(crate) fn edge_tables(&self) -> impl Iterator<Item = (&String, &EdgeTable)> {
        self.outgoing.iter()
    }

    /// Writes one free-form attribute. Structural fields are refused.
    pub fn set_attribute(&mut self, key: &EntityKey, name: &str, value: Value) -> bool {
        if STRUCTURAL_FIELDS.contains(&name) {
            warn!(name, "refusing to overwrite structural field");
            return false;
        }
        let prefixed = key.prefixed();
        let attributes = match key.entity_type {
            EntityType::Address => self.addresses.get_mut(&prefixed).map(|a| &mut a.attributes),
            EntityType::Cluster => self.clusters.get_mut(&prefixed).map(|c| &mut c.attributes),
        };
        match attributes {
            Some(attributes) => {
                attributes.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.addresses.values()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn len(&self) -> usize {
        self.addresses.len() + self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.clusters.is_empty()
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
        self.clusters.clear();
        self.outgoing.clear();
    }

    /// Checks `a.cluster == c <=> a in c.addresses` across the whole store.
    pub fn check_membership(&self) -> Result<()> {
        for address in self.addresses.values() {
            if let Some(cluster_id) = &address.cluster {
                let cluster = self
                    .clusters
                    .get(&prefix(&address.keyspace, cluster_id))
                    .ok_or_else(|| {
                        StoreError::Membership(format!(
                            "address {} points to missing cluster {}",
                            address.id, cluster_id
                        ))
                    })?;
                if !cluster.addresses.contains(&address.id) {
                    return Err(StoreError::Membership(format!(
                        "cluster {} does not list address {}",
                        cluster_id, address.id
                    )));
                }
            }
        }
        for cluster in self.clusters.values() {
            for member in &cluster.addresses {
                let owner = self
                    .addresses
                    .get(&prefix(&cluster.keyspace, member))
                    .and_then(|a| a.cluster.as_deref());
                if owner != Some(cluster.id.as_str()) {
                    return Err(StoreError::Membership(format!(
                        "cluster {} lists address {} owned by {:?}",
                        cluster.id, member, owner
                    )));
                }
            }
        }
        Ok(())
    }
}

impl EntityLookup for GraphStore {
    fn entity(&self, key: &EntityKey) -> Option<EntityRef<'_>> {
        self.get(key)
    }

    fn outgoing_edges(&self, keyspace: &str, id: &str) -> Vec<(String, Option<EdgeStats>)> {
        self.outgoing(keyspace, id)
            .map(|table| table.iter().map(|(t, s)| (t.clone(), s.clone())).collect())
            .unwrap_or_default()
    }
}
