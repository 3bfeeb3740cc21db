use async_trait::async_trait;
use chaingraph_core::{
    Anchor, DataSource, Direction, Entity, EntityAttributes, EntityKey, EntityPayload, EntityType,
    FetchError, FetchResult, GraphView, KeyspaceStats, Neighbor, NeighborSearchResult, NeighborsPage,
    SearchCriterion, StatusMessage, StatusSink, Tag, TracingStatusSink, UndoState,
};
use serde_json::{json, Value};

struct CannedSource;

#[async_trait]
impl DataSource for CannedSource {
    async fn fetch_entity(&self, keyspace: &str, entity_type: EntityType, id: &str) -> FetchResult<Value> {
        match entity_type {
            EntityType::Address => Ok(json!({"address": id, "keyspace": keyspace, "inDegree": 2})),
            EntityType::Cluster => Err(FetchError::new(Some(keyspace), "cluster", "not found")),
        }
    }

    async fn fetch_cluster_for_address(&self, _keyspace: &str, _address: &str) -> FetchResult<Option<Value>> {
        Ok(None)
    }

    async fn fetch_neighbors(
        &self,
        keyspace: &str,
        _id: &str,
        entity_type: EntityType,
        _direction: Direction,
        page_size: usize,
        _page: Option<String>,
    ) -> FetchResult<NeighborsPage> {
        let neighbors = (0..page_size.min(3))
            .map(|i| Neighbor::new(format!("n{}", i), entity_type).with_keyspace(keyspace))
            .collect();
        Ok(NeighborsPage {
            neighbors,
            next_page: None,
        })
    }

    async fn fetch_tags(&self, keyspace: &str, _id: &str, _entity_type: EntityType) -> FetchResult<Vec<Tag>> {
        Ok(vec![Tag::new("exchange").normalized(keyspace)])
    }

    async fn fetch_stats(&self) -> FetchResult<KeyspaceStats> {
        Ok(KeyspaceStats::from([("btc".to_string(), json!({"no_blocks": 1}))]))
    }

    async fn fetch_cluster_addresses(&self, _keyspace: &str, _cluster: &str, _limit: usize) -> FetchResult<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn search(&self, _keyspace: &str, term: &str, _limit: usize) -> FetchResult<Value> {
        Ok(json!({"addresses": [term]}))
    }

    async fn search_neighbors(
        &self,
        _key: &EntityKey,
        _direction: Direction,
        _criterion: &SearchCriterion,
        _depth: usize,
        _breadth: usize,
    ) -> FetchResult<NeighborSearchResult> {
        Ok(NeighborSearchResult::default())
    }
}

#[derive(Default)]
struct CountingView {
    resolved: Vec<(EntityKey, Option<Anchor>)>,
}

impl GraphView for CountingView {
    fn on_entity_resolved(&mut self, entity: &Entity, anchor: Option<&Anchor>) {
        self.resolved.push((entity.key(), anchor.cloned()));
    }
}

#[tokio::test]
async fn data_source_is_object_safe() {
    let source: Box<dyn DataSource> = Box::new(CannedSource);

    let raw = source.fetch_entity("btc", EntityType::Address, "1Abc").await.unwrap();
    let payload = EntityPayload::from_value(raw).unwrap();
    assert_eq!(payload.key(), Some(EntityKey::address("btc", "1Abc")));

    let err = source.fetch_entity("btc", EntityType::Cluster, "7").await.unwrap_err();
    assert_eq!(err.keyspace.as_deref(), Some("btc"));
    assert_eq!(err.to_string(), "cluster failed: not found");

    let page = source
        .fetch_neighbors("btc", "1Abc", EntityType::Address, Direction::Incoming, 100, None)
        .await
        .unwrap();
    assert_eq!(page.neighbors.len(), 3);
    assert_eq!(page.neighbors[0].keyspace.as_deref(), Some("btc"));

    let criterion = SearchCriterion::Category("exchange".into());
    let found = source
        .search_neighbors(&EntityKey::cluster("btc", "7"), Direction::Outgoing, &criterion, 2, 10)
        .await
        .unwrap();
    assert!(found.paths.is_none());
}

#[test]
fn blocking_calls_work_through_tokio_test() {
    let tags = tokio_test::block_on(CannedSource.fetch_tags("ltc", "x", EntityType::Address)).unwrap();
    assert_eq!(tags[0].currency, "LTC");
    let stats = tokio_test::block_on(CannedSource.fetch_stats()).unwrap();
    assert!(stats.contains_key("btc"));
}

#[test]
fn graph_view_defaults_are_inert() {
    let mut view = CountingView::default();
    assert_eq!(view.create_snapshot(), UndoState::default());
    assert_eq!(view.serialize(), Value::Null);

    let entity = Entity::Address(chaingraph_core::Address::new("btc", "a"));
    let anchor = Anchor::new(EntityKey::cluster("btc", "c"), Some(Direction::Outgoing));
    view.on_entity_resolved(&entity, Some(&anchor));
    assert_eq!(view.resolved.len(), 1);
    assert_eq!(view.resolved[0].1.as_ref(), Some(&anchor));

    let mut sink = TracingStatusSink;
    sink.on_loading_state_changed("a", true);
    sink.on_status(&StatusMessage::Loaded {
        entity_type: EntityType::Address,
        id: "a".into(),
    });
    view.redraw();
}

#[test]
fn neighbor_search_notices_name_the_criterion() {
    let found = StatusMessage::FoundNeighbors {
        count: 2,
        criterion: SearchCriterion::Category("mixer".into()),
    };
    assert_eq!(found.to_string(), "Found 2 paths to category mixer");
    assert!(!found.is_error());
}
