#![allow(dead_code)]

use async_trait::async_trait;
use chaingraph_core::{
    Anchor, ChainGraphConfig, DataSource, Direction, Entity, EntityAttributes, EntityKey,
    EntityLookup, EntityType, FetchError, FetchResult, GraphView, KeyspaceStats,
    NeighborSearchResult, NeighborsPage, SearchCriterion, StatusMessage, StatusSink, Tag, UndoState,
};
use chaingraph_explorer::Explorer;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Backend with canned answers that counts every call.
#[derive(Default)]
pub struct MockSource {
    entities: HashMap<(EntityType, String), Value>,
    clusters_for: HashMap<String, Value>,
    neighbors: HashMap<(String, Direction), NeighborsPage>,
    tags: HashMap<String, Vec<Tag>>,
    cluster_addresses: HashMap<String, Vec<Value>>,
    search_hits: HashMap<String, Value>,
    neighbor_searches: HashMap<(String, Direction), NeighborSearchResult>,
    stats: KeyspaceStats,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, value: Value) -> Self {
        let id = value["address"].as_str().unwrap_or_default().to_string();
        self.entities.insert((EntityType::Address, id), value);
        self
    }

    pub fn with_cluster(mut self, value: Value) -> Self {
        let id = id_of(&value["cluster"]);
        self.entities.insert((EntityType::Cluster, id), value);
        self
    }

    /// Answers a request for `(entity_type, id)` with `value`, whatever id it holds.
    pub fn with_entity(mut self, entity_type: EntityType, id: &str, value: Value) -> Self {
        self.entities.insert((entity_type, id.to_string()), value);
        self
    }

    pub fn with_cluster_for(mut self, address: &str, cluster: Value) -> Self {
        self.clusters_for.insert(address.to_string(), cluster);
        self
    }

    pub fn with_neighbors(mut self, id: &str, direction: Direction, page: NeighborsPage) -> Self {
        self.neighbors.insert((id.to_string(), direction), page);
        self
    }

    pub fn with_tags(mut self, id: &str, tags: Vec<Tag>) -> Self {
        self.tags.insert(id.to_string(), tags);
        self
    }

    pub fn with_cluster_addresses(mut self, cluster: &str, addresses: Vec<Value>) -> Self {
        self.cluster_addresses.insert(cluster.to_string(), addresses);
        self
    }

    pub fn with_search_hit(mut self, keyspace: &str, hit: Value) -> Self {
        self.search_hits.insert(keyspace.to_string(), hit);
        self
    }

    pub fn with_neighbor_search(mut self, id: &str, direction: Direction, result: Value) -> Self {
        let result = serde_json::from_value(result).expect("neighbor search result");
        self.neighbor_searches.insert((id.to_string(), direction), result);
        self
    }

    pub fn with_stats(mut self, keyspace: &str, stats: Value) -> Self {
        self.stats.insert(keyspace.to_string(), stats);
        self
    }

    /// Every fetch for `id` fails.
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Every fetch takes `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn enter(&self, call: String, keyspace: &str, id: &str) -> FetchResult<()> {
        self.calls.lock().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(id) {
            return Err(FetchError::new(Some(keyspace), call, "backend unavailable"));
        }
        Ok(())
    }
}

fn id_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_entity(&self, keyspace: &str, entity_type: EntityType, id: &str) -> FetchResult<Value> {
        self.enter(format!("entity:{}:{}", entity_type, id), keyspace, id)
            .await?;
        self.entities
            .get(&(entity_type, id.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::new(Some(keyspace), "entity", format!("{} not found", id)))
    }

    async fn fetch_cluster_for_address(&self, keyspace: &str, address: &str) -> FetchResult<Option<Value>> {
        self.enter(format!("clusterFor:{}", address), keyspace, address)
            .await?;
        Ok(self.clusters_for.get(address).cloned())
    }

    async fn fetch_neighbors(
        &self,
        keyspace: &str,
        id: &str,
        _entity_type: EntityType,
        direction: Direction,
        page_size: usize,
        _page: Option<String>,
    ) -> FetchResult<NeighborsPage> {
        self.enter(format!("neighbors:{}:{}", direction, id), keyspace, id)
            .await?;
        let mut page = self
            .neighbors
            .get(&(id.to_string(), direction))
            .cloned()
            .unwrap_or_default();
        page.neighbors.truncate(page_size);
        Ok(page)
    }

    async fn fetch_tags(&self, keyspace: &str, id: &str, _entity_type: EntityType) -> FetchResult<Vec<Tag>> {
        self.enter(format!("tags:{}", id), keyspace, id).await?;
        Ok(self
            .tags
            .get(id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.normalized(keyspace))
            .collect())
    }

    async fn fetch_stats(&self) -> FetchResult<KeyspaceStats> {
        self.enter("stats".to_string(), "", "").await?;
        Ok(self.stats.clone())
    }

    async fn fetch_cluster_addresses(&self, keyspace: &str, cluster: &str, limit: usize) -> FetchResult<Vec<Value>> {
        self.enter(format!("clusterAddresses:{}", cluster), keyspace, cluster)
            .await?;
        let mut addresses = self
            .cluster_addresses
            .get(cluster)
            .cloned()
            .unwrap_or_default();
        addresses.truncate(limit);
        Ok(addresses)
    }

    async fn search(&self, keyspace: &str, term: &str, _limit: usize) -> FetchResult<Value> {
        self.enter(format!("search:{}:{}", keyspace, term), keyspace, keyspace)
            .await?;
        Ok(self
            .search_hits
            .get(keyspace)
            .cloned()
            .unwrap_or_else(|| json!({"addresses": []})))
    }

    async fn search_neighbors(
        &self,
        key: &EntityKey,
        direction: Direction,
        criterion: &SearchCriterion,
        _depth: usize,
        breadth: usize,
    ) -> FetchResult<NeighborSearchResult> {
        self.enter(
            format!("searchNeighbors:{}:{}:{}", direction, key.id, criterion.as_query()),
            &key.keyspace,
            &key.id,
        )
        .await?;
        let mut result = self
            .neighbor_searches
            .get(&(key.id.clone(), direction))
            .cloned()
            .unwrap_or_default();
        if let Some(paths) = result.paths.as_mut() {
            paths.truncate(breadth);
        }
        Ok(result)
    }
}

#[derive(Debug, Default)]
pub struct ViewLog {
    pub resolved: Vec<(EntityKey, Option<Anchor>)>,
    pub removed: Vec<EntityKey>,
    pub updated: Vec<EntityKey>,
    pub cluster_addresses: Vec<(EntityKey, Vec<EntityKey>)>,
    pub search_results: Vec<(String, String, Value)>,
    pub stats: Vec<KeyspaceStats>,
    pub selected: Vec<EntityKey>,
    pub redraws: usize,
    pub snapshots: usize,
    pub undo_states: Vec<UndoState>,
    pub resets: usize,
    pub restored: Vec<(String, Value)>,
}

/// View that records every hook into a shared log.
pub struct RecordingView(pub Arc<Mutex<ViewLog>>);

impl GraphView for RecordingView {
    fn on_entity_resolved(&mut self, entity: &Entity, anchor: Option<&Anchor>) {
        self.0.lock().resolved.push((entity.key(), anchor.cloned()));
    }

    fn on_entity_removed(&mut self, key: &EntityKey) {
        self.0.lock().removed.push(key.clone());
    }

    fn on_entity_updated(&mut self, key: &EntityKey) {
        self.0.lock().updated.push(key.clone());
    }

    fn on_cluster_addresses(&mut self, cluster: &EntityKey, addresses: &[EntityKey]) {
        self.0
            .lock()
            .cluster_addresses
            .push((cluster.clone(), addresses.to_vec()));
    }

    fn on_search_result(&mut self, keyspace: &str, term: &str, result: &Value) {
        self.0
            .lock()
            .search_results
            .push((keyspace.to_string(), term.to_string(), result.clone()));
    }

    fn on_stats(&mut self, stats: &KeyspaceStats) {
        self.0.lock().stats.push(stats.clone());
    }

    fn select(&mut self, key: &EntityKey) {
        self.0.lock().selected.push(key.clone());
    }

    fn redraw(&mut self) {
        self.0.lock().redraws += 1;
    }

    fn create_snapshot(&mut self) -> UndoState {
        self.0.lock().snapshots += 1;
        UndoState {
            can_undo: true,
            can_redo: false,
        }
    }

    fn set_undo_redo(&mut self, state: UndoState) {
        self.0.lock().undo_states.push(state);
    }

    fn serialize(&self) -> Value {
        let log = self.0.lock();
        let nodes: Vec<String> = log.resolved.iter().map(|(k, _)| k.prefixed()).collect();
        json!({ "nodes": nodes })
    }

    fn restore(
        &mut self,
        version: &str,
        graph: &Value,
        _layout: &Value,
        _store: &dyn EntityLookup,
    ) -> chaingraph_core::Result<()> {
        self.0
            .lock()
            .restored
            .push((version.to_string(), graph.clone()));
        Ok(())
    }

    fn reset(&mut self) {
        let mut log = self.0.lock();
        log.resets += 1;
        log.resolved.clear();
    }
}

#[derive(Debug, Default)]
pub struct StatusLog {
    pub messages: Vec<StatusMessage>,
    pub loading: Vec<(String, bool)>,
}

impl StatusLog {
    /// Ids whose last loading notification was `true`.
    pub fn spinning(&self) -> Vec<String> {
        let mut state: HashMap<&str, bool> = HashMap::new();
        for (id, loading) in &self.loading {
            state.insert(id, *loading);
        }
        let mut ids: Vec<String> = state
            .into_iter()
            .filter(|(_, loading)| *loading)
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn errors(&self) -> Vec<&StatusMessage> {
        self.messages.iter().filter(|m| m.is_error()).collect()
    }
}

pub struct RecordingStatus(pub Arc<Mutex<StatusLog>>);

impl StatusSink for RecordingStatus {
    fn on_loading_state_changed(&mut self, id: &str, is_loading: bool) {
        self.0.lock().loading.push((id.to_string(), is_loading));
    }

    fn on_status(&mut self, message: &StatusMessage) {
        self.0.lock().messages.push(message.clone());
    }
}

pub struct Harness {
    pub explorer: Explorer,
    pub source: Arc<MockSource>,
    pub view: Arc<Mutex<ViewLog>>,
    pub status: Arc<Mutex<StatusLog>>,
}

pub fn harness(source: MockSource) -> Harness {
    harness_with(ChainGraphConfig::default(), source)
}

pub fn harness_with(config: ChainGraphConfig, source: MockSource) -> Harness {
    let source = Arc::new(source);
    let view = Arc::new(Mutex::new(ViewLog::default()));
    let status = Arc::new(Mutex::new(StatusLog::default()));
    let explorer = Explorer::new(
        config,
        source.clone(),
        Box::new(RecordingView(view.clone())),
        Box::new(RecordingStatus(status.clone())),
    )
    .expect("explorer");
    Harness {
        explorer,
        source,
        view,
        status,
    }
}

pub fn resolved_keys(view: &Mutex<ViewLog>) -> Vec<EntityKey> {
    view.lock().resolved.iter().map(|(k, _)| k.clone()).collect()
}

pub fn tag(label: &str) -> Tag {
    Tag::new(label)
}

/// `1A` in btc, whose cluster `7` is only known through the cluster lookup.
pub fn clustered_address_source() -> MockSource {
    MockSource::new()
        .with_address(json!({"address": "1A", "keyspace": "btc", "inDegree": 3, "outDegree": 1}))
        .with_cluster_for(
            "1A",
            json!({"cluster": 7, "keyspace": "btc", "inDegree": 2, "outDegree": 150, "noAddresses": 1}),
        )
        .with_neighbors(
            "7",
            Direction::Incoming,
            NeighborsPage {
                neighbors: vec![
                    serde_json::from_value(json!({"id": 8, "nodeType": "cluster", "noTransactions": 4, "estimatedValue": {"satoshi": 100}})).expect("neighbor"),
                    serde_json::from_value(json!({"id": "9", "nodeType": "cluster"})).expect("neighbor"),
                    serde_json::from_value(json!({"id": "1Z", "nodeType": "address"})).expect("neighbor"),
                ],
                next_page: None,
            },
        )
        .with_tags("1A", vec![tag("exchange")])
}
