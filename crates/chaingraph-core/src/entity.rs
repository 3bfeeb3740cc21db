use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::types::{EntityKey, EntityType, Tag};

/// Attribute names with structural meaning; they never live in the free-form
/// attribute map.
pub const STRUCTURAL_FIELDS: &[&str] = &[
    "id",
    "type",
    "address",
    "cluster",
    "toCluster",
    "keyspace",
    "forAddresses",
    "addresses",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub keyspace: String,
    /// Id of the owning cluster in the same keyspace.
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Address {
    pub fn new(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keyspace: keyspace.into(),
            cluster: None,
            attributes: Map::new(),
        }
    }

    pub fn cluster_key(&self) -> Option<EntityKey> {
        self.cluster
            .as_ref()
            .map(|c| EntityKey::cluster(self.keyspace.clone(), c.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub keyspace: String,
    /// Ids of member addresses in the same keyspace.
    #[serde(default)]
    pub addresses: BTreeSet<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Cluster {
    pub fn new(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keyspace: keyspace.into(),
            addresses: BTreeSet::new(),
            attributes: Map::new(),
        }
    }
}

/// Read access shared by addresses and clusters.
pub trait EntityAttributes {
    fn key(&self) -> EntityKey;
    fn attributes(&self) -> &Map<String, Value>;

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes().get(name)
    }

    /// Missing or non-numeric degrees count as zero.
    fn in_degree(&self) -> u64 {
        self.attribute("inDegree").and_then(Value::as_u64).unwrap_or(0)
    }

    fn out_degree(&self) -> u64 {
        self.attribute("outDegree").and_then(Value::as_u64).unwrap_or(0)
    }

    fn has_tags(&self) -> bool {
        matches!(self.attribute("tags"), Some(Value::Array(_)))
    }

    fn tags(&self) -> Vec<Tag> {
        match self.attribute("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn notes(&self) -> Option<&str> {
        self.attribute("notes").and_then(Value::as_str)
    }

    fn is_mockup(&self) -> bool {
        matches!(self.attribute("mockup"), Some(Value::Bool(true)))
    }
}

impl EntityAttributes for Address {
    fn key(&self) -> EntityKey {
        EntityKey::address(self.keyspace.clone(), self.id.clone())
    }

    fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

impl EntityAttributes for Cluster {
    fn key(&self) -> EntityKey {
        EntityKey::cluster(self.keyspace.clone(), self.id.clone())
    }

    fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

/// Owned entity, as handed to collaborators outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Address(Address),
    Cluster(Cluster),
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Address(_) => EntityType::Address,
            Entity::Cluster(_) => EntityType::Cluster,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Address(a) => &a.id,
            Entity::Cluster(c) => &c.id,
        }
    }

    pub fn view(&self) -> EntityRef<'_> {
        match self {
            Entity::Address(a) => EntityRef::Address(a),
            Entity::Cluster(c) => EntityRef::Cluster(c),
        }
    }

    pub fn to_value(&self) -> Value {
        self.view().to_value()
    }
}

impl EntityAttributes for Entity {
    fn key(&self) -> EntityKey {
        self.view().key()
    }

    fn attributes(&self) -> &Map<String, Value> {
        match self {
            Entity::Address(a) => &a.attributes,
            Entity::Cluster(c) => &c.attributes,
        }
    }
}

/// Borrowed view of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Address(&'a Address),
    Cluster(&'a Cluster),
}

impl<'a> EntityRef<'a> {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRef::Address(_) => EntityType::Address,
            EntityRef::Cluster(_) => EntityType::Cluster,
        }
    }

    pub fn id(&self) -> &'a str {
        match self {
            EntityRef::Address(a) => &a.id,
            EntityRef::Cluster(c) => &c.id,
        }
    }

    pub fn keyspace(&self) -> &'a str {
        match self {
            EntityRef::Address(a) => &a.keyspace,
            EntityRef::Cluster(c) => &c.keyspace,
        }
    }

    pub fn as_address(&self) -> Option<&'a Address> {
        match self {
            EntityRef::Address(a) => Some(a),
            EntityRef::Cluster(_) => None,
        }
    }

    pub fn as_cluster(&self) -> Option<&'a Cluster> {
        match self {
            EntityRef::Cluster(c) => Some(c),
            EntityRef::Address(_) => None,
        }
    }

    pub fn to_entity(&self) -> Entity {
        match self {
            EntityRef::Address(a) => Entity::Address((*a).clone()),
            EntityRef::Cluster(c) => Entity::Cluster((*c).clone()),
        }
    }

    /// Flat JSON form: attributes plus identity, with the cluster collapsed to its id
    /// and members collapsed to an id list.
    pub fn to_value(&self) -> Value {
        let mut object = self.attributes().clone();
        object.insert("id".into(), Value::String(self.id().to_string()));
        object.insert("keyspace".into(), Value::String(self.keyspace().to_string()));
        object.insert("type".into(), Value::String(self.entity_type().to_string()));
        match self {
            EntityRef::Address(a) => {
                if let Some(cluster) = &a.cluster {
                    object.insert("cluster".into(), Value::String(cluster.clone()));
                }
            }
            EntityRef::Cluster(c) => {
                let members = c.addresses.iter().cloned().map(Value::String).collect();
                object.insert("addresses".into(), Value::Array(members));
            }
        }
        Value::Object(object)
    }
}

impl<'a> EntityAttributes for EntityRef<'a> {
    fn key(&self) -> EntityKey {
        match self {
            EntityRef::Address(a) => a.key(),
            EntityRef::Cluster(c) => c.key(),
        }
    }

    fn attributes(&self) -> &Map<String, Value> {
        match self {
            EntityRef::Address(a) => &a.attributes,
            EntityRef::Cluster(c) => &c.attributes,
        }
    }
}
