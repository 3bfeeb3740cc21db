use serde_json::{Map, Value};

use crate::entity::STRUCTURAL_FIELDS;
use crate::types::{is_truthy, scalar_id, EntityKey, EntityType};
use crate::{ChainGraphError, Result};

/// Address record as parsed from a wire payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressPayload {
    pub id: String,
    pub keyspace: Option<String>,
    /// Owning cluster id, taken from `cluster` or `toCluster`.
    pub cluster: Option<String>,
    pub attributes: Map<String, Value>,
}

/// Cluster record as parsed from a wire payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPayload {
    pub id: String,
    pub keyspace: Option<String>,
    /// Member addresses to link if they are already known.
    pub for_addresses: Vec<String>,
    pub attributes: Map<String, Value>,
}

/// Disambiguated entity payload. Raw JSON is classified by shape once, here, so the
/// store never inspects field presence to decide what it is merging.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    Address(AddressPayload),
    Cluster(ClusterPayload),
}

impl EntityPayload {
    /// Classifies a raw object: a truthy `address` key or `type == "address"` makes an
    /// address, otherwise a truthy `cluster` key or `type == "cluster"` makes a cluster.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(ChainGraphError::Validation(format!(
                    "entity payload must be an object, got {}",
                    other
                )))
            }
        };

        let type_is = |name: &str| object.get("type").and_then(Value::as_str) == Some(name);
        let truthy = |name: &str| object.get(name).map(is_truthy).unwrap_or(false);

        let keyspace = object
            .get("keyspace")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        if truthy("address") || type_is("address") {
            let id = Self::identity(&object, "address")?;
            let cluster = Self::cluster_reference(&object);
            Ok(EntityPayload::Address(AddressPayload {
                id,
                keyspace,
                cluster,
                attributes: Self::strip_structural(object),
            }))
        } else if truthy("cluster") || type_is("cluster") {
            let id = Self::identity(&object, "cluster")?;
            let for_addresses = object
                .get("forAddresses")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(scalar_id).collect())
                .unwrap_or_default();
            Ok(EntityPayload::Cluster(ClusterPayload {
                id,
                keyspace,
                for_addresses,
                attributes: Self::strip_structural(object),
            }))
        } else {
            Err(ChainGraphError::Validation(
                "cannot determine entity type of payload".to_string(),
            ))
        }
    }

    pub fn address(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        EntityPayload::Address(AddressPayload {
            id: id.into(),
            keyspace: Some(keyspace.into()),
            cluster: None,
            attributes: Map::new(),
        })
    }

    pub fn cluster(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        EntityPayload::Cluster(ClusterPayload {
            id: id.into(),
            keyspace: Some(keyspace.into()),
            for_addresses: Vec::new(),
            attributes: Map::new(),
        })
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityPayload::Address(_) => EntityType::Address,
            EntityPayload::Cluster(_) => EntityType::Cluster,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityPayload::Address(a) => &a.id,
            EntityPayload::Cluster(c) => &c.id,
        }
    }

    pub fn keyspace(&self) -> Option<&str> {
        match self {
            EntityPayload::Address(a) => a.keyspace.as_deref(),
            EntityPayload::Cluster(c) => c.keyspace.as_deref(),
        }
    }

    pub fn key(&self) -> Option<EntityKey> {
        self.keyspace()
            .map(|ks| EntityKey::new(ks, self.entity_type(), self.id()))
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        match self {
            EntityPayload::Address(a) => &a.attributes,
            EntityPayload::Cluster(c) => &c.attributes,
        }
    }

    /// Fills in the keyspace when the payload does not carry one.
    pub fn with_default_keyspace(mut self, keyspace: &str) -> Self {
        let slot = match &mut self {
            EntityPayload::Address(a) => &mut a.keyspace,
            EntityPayload::Cluster(c) => &mut c.keyspace,
        };
        if slot.is_none() {
            *slot = Some(keyspace.to_string());
        }
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        let attributes = match &mut self {
            EntityPayload::Address(a) => &mut a.attributes,
            EntityPayload::Cluster(c) => &mut c.attributes,
        };
        attributes.insert(name.into(), value);
        self
    }

    /// Sets the owning cluster of an address payload; no-op for clusters.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        if let EntityPayload::Address(a) = &mut self {
            a.cluster = Some(cluster.into());
        }
        self
    }

    /// Adds member addresses to a cluster payload; no-op for addresses.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let EntityPayload::Cluster(c) = &mut self {
            c.for_addresses.extend(members.into_iter().map(Into::into));
        }
        self
    }

    fn identity(object: &Map<String, Value>, type_field: &str) -> Result<String> {
        object
            .get(type_field)
            .and_then(scalar_id)
            .or_else(|| object.get("id").and_then(scalar_id))
            .ok_or_else(|| {
                ChainGraphError::Validation(format!("{} payload without id", type_field))
            })
    }

    fn cluster_reference(object: &Map<String, Value>) -> Option<String> {
        match object.get("cluster") {
            Some(Value::Object(nested)) => nested
                .get("cluster")
                .and_then(scalar_id)
                .or_else(|| nested.get("id").and_then(scalar_id)),
            Some(value) => scalar_id(value),
            None => None,
        }
        .or_else(|| object.get("toCluster").and_then(scalar_id))
    }

    fn strip_structural(mut object: Map<String, Value>) -> Map<String, Value> {
        for field in STRUCTURAL_FIELDS {
            object.remove(*field);
        }
        object
    }
}

impl TryFrom<Value> for EntityPayload {
    type Error = ChainGraphError;

    fn try_from(value: Value) -> Result<Self> {
        EntityPayload::from_value(value)
    }
}
