use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ChainGraphError;

/// Separator between keyspace and id in prefixed identifiers (`btc|1Archive...`).
pub const KEY_SEPARATOR: char = '|';

/// Per-keyspace statistics as returned by the stats endpoint.
pub type KeyspaceStats = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Address,
    Cluster,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Address => "address",
            EntityType::Cluster => "cluster",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ChainGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address" => Ok(EntityType::Address),
            "cluster" => Ok(EntityType::Cluster),
            other => Err(ChainGraphError::Validation(format!(
                "unknown entity type: {}",
                other
            ))),
        }
    }
}

/// Arena-style identity of an entity: (keyspace, type, id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub keyspace: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityKey {
    pub fn new(keyspace: impl Into<String>, entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            entity_type,
            id: id.into(),
        }
    }

    pub fn address(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(keyspace, EntityType::Address, id)
    }

    pub fn cluster(keyspace: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(keyspace, EntityType::Cluster, id)
    }

    pub fn prefixed(&self) -> String {
        prefix(&self.keyspace, &self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.entity_type, self.id, self.keyspace)
    }
}

pub fn prefix(keyspace: &str, id: &str) -> String {
    format!("{}{}{}", keyspace, KEY_SEPARATOR, id)
}

/// Splits a prefixed id at the first separator. Ids without a separator come back
/// with no keyspace.
pub fn unprefix(prefixed: &str) -> (Option<&str>, &str) {
    match prefixed.split_once(KEY_SEPARATOR) {
        Some((keyspace, id)) => (Some(keyspace), id),
        None => (None, prefixed),
    }
}

/// Normalizes an opaque string/number id to its string form.
pub fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON truthiness: null, false, 0 and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_id(&value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Direction::Outgoing)
    }

    /// Query-string form used by the neighbors endpoint.
    pub fn as_query(&self) -> &'static str {
        match self {
            Direction::Incoming => "in",
            Direction::Outgoing => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        })
    }
}

/// Placement hint for attaching a newly resolved entity to an already rendered node.
/// `direction` is relative to `node`: `Outgoing` means `node -> new entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub node: EntityKey,
    #[serde(default)]
    pub direction: Option<Direction>,
}

impl Anchor {
    pub fn new(node: EntityKey, direction: Option<Direction>) -> Self {
        Self { node, direction }
    }
}

/// Aggregate statistics of a known edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStats {
    pub no_transactions: u64,
    pub estimated_value: Value,
}

/// Edge data as it arrives from the backend; either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default)]
    pub no_transactions: Option<u64>,
    #[serde(default)]
    pub estimated_value: Option<Value>,
}

impl EdgeData {
    pub fn new(no_transactions: u64, estimated_value: impl Into<Value>) -> Self {
        Self {
            no_transactions: Some(no_transactions),
            estimated_value: Some(estimated_value.into()),
        }
    }

    /// Stats only when both fields are present and truthy; anything less counts as
    /// "no data".
    pub fn complete(&self) -> Option<EdgeStats> {
        let no_transactions = self.no_transactions.filter(|n| *n > 0)?;
        let estimated_value = self.estimated_value.as_ref().filter(|v| is_truthy(v))?;
        Some(EdgeStats {
            no_transactions,
            estimated_value: estimated_value.clone(),
        })
    }
}

impl From<EdgeStats> for EdgeData {
    fn from(stats: EdgeStats) -> Self {
        Self {
            no_transactions: Some(stats.no_transactions),
            estimated_value: Some(stats.estimated_value),
        }
    }
}

/// One row of a neighbors page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub node_type: EntityType,
    #[serde(default)]
    pub keyspace: Option<String>,
    #[serde(flatten)]
    pub edge: EdgeData,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Neighbor {
    pub fn new(id: impl Into<String>, node_type: EntityType) -> Self {
        Self {
            id: id.into(),
            node_type,
            keyspace: None,
            edge: EdgeData::default(),
            attributes: Map::new(),
        }
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_edge(mut self, edge: EdgeData) -> Self {
        self.edge = edge;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborsPage {
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// What a neighbor path search looks for at the end of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchCriterion {
    /// An entity tagged with this category.
    Category(String),
    /// A cluster holding any of these addresses.
    Addresses(Vec<String>),
}

impl SearchCriterion {
    /// Query-string form used by the search endpoint.
    pub fn as_query(&self) -> String {
        match self {
            SearchCriterion::Category(category) => format!("category={}", category),
            SearchCriterion::Addresses(addresses) => format!("addresses={}", addresses.join(",")),
        }
    }
}

impl fmt::Display for SearchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchCriterion::Category(category) => write!(f, "category {}", category),
            SearchCriterion::Addresses(addresses) => write!(f, "addresses {}", addresses.join(", ")),
        }
    }
}

/// One hop of a neighbor search result. A hop without `paths` completes a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPath {
    /// Raw entity payload of the hop.
    pub node: Value,
    /// Edge between the previous hop and this one.
    #[serde(default)]
    pub relation: Option<EdgeData>,
    /// Addresses of the hop's cluster that matched an `addresses` criterion.
    #[serde(default)]
    pub matching_addresses: Vec<Value>,
    #[serde(default)]
    pub paths: Option<Vec<SearchPath>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborSearchResult {
    #[serde(default)]
    pub paths: Option<Vec<SearchPath>>,
}

/// Tag annotation, normalized so that `currency` and `keyspace` are always set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub keyspace: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tag {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            category: None,
            currency: String::new(),
            keyspace: String::new(),
            extra: Map::new(),
        }
    }

    pub fn normalized(mut self, keyspace: &str) -> Self {
        self.currency = keyspace.to_uppercase();
        self.keyspace = keyspace.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefix_round_trip() {
        let p = prefix("btc", "1Archive");
        assert_eq!(p, "btc|1Archive");
        assert_eq!(unprefix(&p), (Some("btc"), "1Archive"));
        assert_eq!(unprefix("42"), (None, "42"));
    }

    #[test]
    fn edge_data_requires_both_fields() {
        assert!(EdgeData::new(5, 10).complete().is_some());
        let partial = EdgeData {
            no_transactions: Some(5),
            estimated_value: None,
        };
        assert!(partial.complete().is_none());
        assert!(EdgeData::new(0, 10).complete().is_none());
    }

    #[test]
    fn neighbor_accepts_numeric_ids() {
        let n: Neighbor = serde_json::from_value(json!({
            "id": 123,
            "nodeType": "cluster",
            "keyspace": "btc",
            "noTransactions": 3,
            "estimatedValue": {"satoshi": 100},
            "balance": 7
        }))
        .unwrap();
        assert_eq!(n.id, "123");
        assert_eq!(n.node_type, EntityType::Cluster);
        assert!(n.edge.complete().is_some());
        assert_eq!(n.attributes.get("balance"), Some(&json!(7)));
    }

    #[test]
    fn search_paths_nest_and_end_without_paths() {
        let result: NeighborSearchResult = serde_json::from_value(json!({
            "paths": [{
                "node": {"cluster": 8},
                "relation": {"noTransactions": 2, "estimatedValue": 10},
                "matchingAddresses": [],
                "paths": [{"node": {"cluster": 9}, "relation": null, "matchingAddresses": [{"address": "1M"}], "paths": null}]
            }]
        }))
        .unwrap();
        let first = &result.paths.as_ref().unwrap()[0];
        assert!(first.relation.as_ref().and_then(EdgeData::complete).is_some());
        let last = &first.paths.as_ref().unwrap()[0];
        assert!(last.relation.is_none());
        assert!(last.paths.is_none());
        assert_eq!(last.matching_addresses.len(), 1);
        assert_eq!(
            SearchCriterion::Addresses(vec!["1A".into(), "1B".into()]).as_query(),
            "addresses=1A,1B"
        );
    }

    #[test]
    fn tag_normalization() {
        let tag = Tag::new("exchange").normalized("ltc");
        assert_eq!(tag.currency, "LTC");
        assert_eq!(tag.keyspace, "ltc");
    }
}
